//! CIL instruction set table.
//!
//! The whole instruction set lives in one place, [`for_each_opcode!`]. Every
//! row carries the enum variant, the builder method name, the mnemonic, the
//! encoding (two-byte opcodes use the `0xFE` prefix in the high byte), the
//! operand shape and a one-line description. The [`OpCode`] enum, its
//! lookup tables, the encoder/decoder and the fluent builder in
//! `ilforge-emit` are all generated from this table.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use core::fmt;

/// Shape of the inline operand that follows an opcode in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperandKind {
    /// No operand.
    None,
    /// Signed 8-bit immediate (`ldc.i4.s`).
    ShortI8,
    /// Unsigned 8-bit immediate (`unaligned.`, `no.`).
    U8,
    /// 32-bit immediate.
    Int32,
    /// 64-bit immediate.
    Int64,
    /// 32-bit float immediate.
    Float32,
    /// 64-bit float immediate.
    Float64,
    /// 8-bit relative branch target.
    ShortBranch,
    /// 32-bit relative branch target.
    Branch,
    /// Jump table: `u32` count followed by 32-bit relative targets.
    Switch,
    /// 8-bit argument/local index.
    ShortVar,
    /// 16-bit argument/local index.
    Var,
    /// User string token.
    String,
    /// Type token.
    Type,
    /// Field token.
    Field,
    /// Method token.
    Method,
    /// Type, field or method token (`ldtoken`).
    Token,
    /// Stand-alone signature token (`calli`).
    Sig,
}

impl OperandKind {
    /// Size in bytes of the inline operand. `Switch` reports the size of its
    /// count prefix only; the table adds four bytes per target.
    pub const fn inline_size(self) -> u32 {
        match self {
            OperandKind::None => 0,
            OperandKind::ShortI8 | OperandKind::U8 | OperandKind::ShortBranch | OperandKind::ShortVar => 1,
            OperandKind::Var => 2,
            OperandKind::Int64 | OperandKind::Float64 => 8,
            OperandKind::Int32
            | OperandKind::Float32
            | OperandKind::Branch
            | OperandKind::Switch
            | OperandKind::String
            | OperandKind::Type
            | OperandKind::Field
            | OperandKind::Method
            | OperandKind::Token
            | OperandKind::Sig => 4,
        }
    }

    /// True for the two branch-target shapes (not `Switch`).
    pub const fn is_branch(self) -> bool {
        matches!(self, OperandKind::ShortBranch | OperandKind::Branch)
    }
}

/// The instruction table. Invoke with the name of a macro that accepts the
/// rows `($variant, $method, $mnemonic, $encoding, $kind, $doc)`.
#[macro_export]
macro_rules! for_each_opcode {
    ($m:ident) => {
        $m! {
            (Nop, nop, "nop", 0x00, None, "Fills space if opcodes are patched. No meaningful operation is performed.")
            (Break, break_, "break", 0x01, None, "Signals the host that a breakpoint has been tripped.")
            (Ldarg_0, ldarg_0, "ldarg.0", 0x02, None, "Loads the argument at index 0 onto the evaluation stack.")
            (Ldarg_1, ldarg_1, "ldarg.1", 0x03, None, "Loads the argument at index 1 onto the evaluation stack.")
            (Ldarg_2, ldarg_2, "ldarg.2", 0x04, None, "Loads the argument at index 2 onto the evaluation stack.")
            (Ldarg_3, ldarg_3, "ldarg.3", 0x05, None, "Loads the argument at index 3 onto the evaluation stack.")
            (Ldloc_0, ldloc_0, "ldloc.0", 0x06, None, "Loads the local variable at index 0 onto the evaluation stack.")
            (Ldloc_1, ldloc_1, "ldloc.1", 0x07, None, "Loads the local variable at index 1 onto the evaluation stack.")
            (Ldloc_2, ldloc_2, "ldloc.2", 0x08, None, "Loads the local variable at index 2 onto the evaluation stack.")
            (Ldloc_3, ldloc_3, "ldloc.3", 0x09, None, "Loads the local variable at index 3 onto the evaluation stack.")
            (Stloc_0, stloc_0, "stloc.0", 0x0A, None, "Pops the top of the stack into the local variable at index 0.")
            (Stloc_1, stloc_1, "stloc.1", 0x0B, None, "Pops the top of the stack into the local variable at index 1.")
            (Stloc_2, stloc_2, "stloc.2", 0x0C, None, "Pops the top of the stack into the local variable at index 2.")
            (Stloc_3, stloc_3, "stloc.3", 0x0D, None, "Pops the top of the stack into the local variable at index 3.")
            (Ldarg_S, ldarg_s, "ldarg.s", 0x0E, ShortVar, "Loads the argument (short form index) onto the evaluation stack.")
            (Ldarga_S, ldarga_s, "ldarga.s", 0x0F, ShortVar, "Loads the address of an argument, short form index.")
            (Starg_S, starg_s, "starg.s", 0x10, ShortVar, "Stores the top of the stack in an argument slot, short form index.")
            (Ldloc_S, ldloc_s, "ldloc.s", 0x11, ShortVar, "Loads the local variable at a specific index onto the evaluation stack, short form.")
            (Ldloca_S, ldloca_s, "ldloca.s", 0x12, ShortVar, "Loads the address of the local variable at a specific index, short form.")
            (Stloc_S, stloc_s, "stloc.s", 0x13, ShortVar, "Pops the top of the stack into a local variable, short form index.")
            (Ldnull, ldnull, "ldnull", 0x14, None, "Pushes a null reference onto the evaluation stack.")
            (Ldc_I4_M1, ldc_i4_m1, "ldc.i4.m1", 0x15, None, "Pushes the integer value -1 onto the evaluation stack as an int32.")
            (Ldc_I4_0, ldc_i4_0, "ldc.i4.0", 0x16, None, "Pushes the integer value 0 onto the evaluation stack as an int32.")
            (Ldc_I4_1, ldc_i4_1, "ldc.i4.1", 0x17, None, "Pushes the integer value 1 onto the evaluation stack as an int32.")
            (Ldc_I4_2, ldc_i4_2, "ldc.i4.2", 0x18, None, "Pushes the integer value 2 onto the evaluation stack as an int32.")
            (Ldc_I4_3, ldc_i4_3, "ldc.i4.3", 0x19, None, "Pushes the integer value 3 onto the evaluation stack as an int32.")
            (Ldc_I4_4, ldc_i4_4, "ldc.i4.4", 0x1A, None, "Pushes the integer value 4 onto the evaluation stack as an int32.")
            (Ldc_I4_5, ldc_i4_5, "ldc.i4.5", 0x1B, None, "Pushes the integer value 5 onto the evaluation stack as an int32.")
            (Ldc_I4_6, ldc_i4_6, "ldc.i4.6", 0x1C, None, "Pushes the integer value 6 onto the evaluation stack as an int32.")
            (Ldc_I4_7, ldc_i4_7, "ldc.i4.7", 0x1D, None, "Pushes the integer value 7 onto the evaluation stack as an int32.")
            (Ldc_I4_8, ldc_i4_8, "ldc.i4.8", 0x1E, None, "Pushes the integer value 8 onto the evaluation stack as an int32.")
            (Ldc_I4_S, ldc_i4_s, "ldc.i4.s", 0x1F, ShortI8, "Pushes the supplied int8 value onto the evaluation stack as an int32, short form.")
            (Ldc_I4, ldc_i4, "ldc.i4", 0x20, Int32, "Pushes a supplied value of type int32 onto the evaluation stack.")
            (Ldc_I8, ldc_i8, "ldc.i8", 0x21, Int64, "Pushes a supplied value of type int64 onto the evaluation stack.")
            (Ldc_R4, ldc_r4, "ldc.r4", 0x22, Float32, "Pushes a supplied value of type float32 onto the evaluation stack as type F (float).")
            (Ldc_R8, ldc_r8, "ldc.r8", 0x23, Float64, "Pushes a supplied value of type float64 onto the evaluation stack as type F (float).")
            (Dup, dup, "dup", 0x25, None, "Copies the topmost value on the evaluation stack and pushes the copy.")
            (Pop, pop, "pop", 0x26, None, "Removes the value currently on top of the evaluation stack.")
            (Jmp, jmp, "jmp", 0x27, Method, "Exits the current method and jumps to the specified method.")
            (Call, call, "call", 0x28, Method, "Calls the method indicated by the passed method descriptor.")
            (Calli, calli, "calli", 0x29, Sig, "Calls the method indicated on the evaluation stack (as a pointer to an entry point) with arguments described by a calling convention.")
            (Ret, ret, "ret", 0x2A, None, "Returns from the current method, pushing a return value (if present) from the callee's evaluation stack onto the caller's.")
            (Br_S, br_s, "br.s", 0x2B, ShortBranch, "Unconditionally transfers control to a target instruction (short form).")
            (Brfalse_S, brfalse_s, "brfalse.s", 0x2C, ShortBranch, "Transfers control to a target instruction if value is false, a null reference, or zero (short form).")
            (Brtrue_S, brtrue_s, "brtrue.s", 0x2D, ShortBranch, "Transfers control to a target instruction if value is true, not null, or non-zero (short form).")
            (Beq_S, beq_s, "beq.s", 0x2E, ShortBranch, "Transfers control to a target instruction (short form) if two values are equal.")
            (Bge_S, bge_s, "bge.s", 0x2F, ShortBranch, "Transfers control to a target instruction (short form) if the first value is greater than or equal to the second value.")
            (Bgt_S, bgt_s, "bgt.s", 0x30, ShortBranch, "Transfers control to a target instruction (short form) if the first value is greater than the second value.")
            (Ble_S, ble_s, "ble.s", 0x31, ShortBranch, "Transfers control to a target instruction (short form) if the first value is less than or equal to the second value.")
            (Blt_S, blt_s, "blt.s", 0x32, ShortBranch, "Transfers control to a target instruction (short form) if the first value is less than the second value.")
            (Bne_Un_S, bne_un_s, "bne.un.s", 0x33, ShortBranch, "Transfers control to a target instruction (short form) when two unsigned integer values or unordered float values are not equal.")
            (Bge_Un_S, bge_un_s, "bge.un.s", 0x34, ShortBranch, "Transfers control to a target instruction (short form) if the first value is greater than or equal to the second value, when comparing unsigned integer values or unordered float values.")
            (Bgt_Un_S, bgt_un_s, "bgt.un.s", 0x35, ShortBranch, "Transfers control to a target instruction (short form) if the first value is greater than the second value, when comparing unsigned integer values or unordered float values.")
            (Ble_Un_S, ble_un_s, "ble.un.s", 0x36, ShortBranch, "Transfers control to a target instruction (short form) if the first value is less than or equal to the second value, when comparing unsigned integer values or unordered float values.")
            (Blt_Un_S, blt_un_s, "blt.un.s", 0x37, ShortBranch, "Transfers control to a target instruction (short form) if the first value is less than the second value, when comparing unsigned integer values or unordered float values.")
            (Br, br, "br", 0x38, Branch, "Unconditionally transfers control to a target instruction.")
            (Brfalse, brfalse, "brfalse", 0x39, Branch, "Transfers control to a target instruction if value is false, a null reference, or zero.")
            (Brtrue, brtrue, "brtrue", 0x3A, Branch, "Transfers control to a target instruction if value is true, not null, or non-zero.")
            (Beq, beq, "beq", 0x3B, Branch, "Transfers control to a target instruction if two values are equal.")
            (Bge, bge, "bge", 0x3C, Branch, "Transfers control to a target instruction if the first value is greater than or equal to the second value.")
            (Bgt, bgt, "bgt", 0x3D, Branch, "Transfers control to a target instruction if the first value is greater than the second value.")
            (Ble, ble, "ble", 0x3E, Branch, "Transfers control to a target instruction if the first value is less than or equal to the second value.")
            (Blt, blt, "blt", 0x3F, Branch, "Transfers control to a target instruction if the first value is less than the second value.")
            (Bne_Un, bne_un, "bne.un", 0x40, Branch, "Transfers control to a target instruction when two unsigned integer values or unordered float values are not equal.")
            (Bge_Un, bge_un, "bge.un", 0x41, Branch, "Transfers control to a target instruction if the first value is greater than or equal to the second value, when comparing unsigned integer values or unordered float values.")
            (Bgt_Un, bgt_un, "bgt.un", 0x42, Branch, "Transfers control to a target instruction if the first value is greater than the second value, when comparing unsigned integer values or unordered float values.")
            (Ble_Un, ble_un, "ble.un", 0x43, Branch, "Transfers control to a target instruction if the first value is less than or equal to the second value, when comparing unsigned integer values or unordered float values.")
            (Blt_Un, blt_un, "blt.un", 0x44, Branch, "Transfers control to a target instruction if the first value is less than the second value, when comparing unsigned integer values or unordered float values.")
            (Switch, switch, "switch", 0x45, Switch, "Implements a jump table.")
            (Ldind_I1, ldind_i1, "ldind.i1", 0x46, None, "Loads a value of type int8 as an int32 onto the evaluation stack indirectly.")
            (Ldind_U1, ldind_u1, "ldind.u1", 0x47, None, "Loads a value of type unsigned int8 as an int32 onto the evaluation stack indirectly.")
            (Ldind_I2, ldind_i2, "ldind.i2", 0x48, None, "Loads a value of type int16 as an int32 onto the evaluation stack indirectly.")
            (Ldind_U2, ldind_u2, "ldind.u2", 0x49, None, "Loads a value of type unsigned int16 as an int32 onto the evaluation stack indirectly.")
            (Ldind_I4, ldind_i4, "ldind.i4", 0x4A, None, "Loads a value of type int32 as an int32 onto the evaluation stack indirectly.")
            (Ldind_U4, ldind_u4, "ldind.u4", 0x4B, None, "Loads a value of type unsigned int32 as an int32 onto the evaluation stack indirectly.")
            (Ldind_I8, ldind_i8, "ldind.i8", 0x4C, None, "Loads a value of type int64 as an int64 onto the evaluation stack indirectly.")
            (Ldind_I, ldind_i, "ldind.i", 0x4D, None, "Loads a value of type native int as a native int onto the evaluation stack indirectly.")
            (Ldind_R4, ldind_r4, "ldind.r4", 0x4E, None, "Loads a value of type float32 as a type F (float) onto the evaluation stack indirectly.")
            (Ldind_R8, ldind_r8, "ldind.r8", 0x4F, None, "Loads a value of type float64 as a type F (float) onto the evaluation stack indirectly.")
            (Ldind_Ref, ldind_ref, "ldind.ref", 0x50, None, "Loads an object reference as a type O (object reference) onto the evaluation stack indirectly.")
            (Stind_Ref, stind_ref, "stind.ref", 0x51, None, "Stores an object reference value at a supplied address.")
            (Stind_I1, stind_i1, "stind.i1", 0x52, None, "Stores a value of type int8 at a supplied address.")
            (Stind_I2, stind_i2, "stind.i2", 0x53, None, "Stores a value of type int16 at a supplied address.")
            (Stind_I4, stind_i4, "stind.i4", 0x54, None, "Stores a value of type int32 at a supplied address.")
            (Stind_I8, stind_i8, "stind.i8", 0x55, None, "Stores a value of type int64 at a supplied address.")
            (Stind_R4, stind_r4, "stind.r4", 0x56, None, "Stores a value of type float32 at a supplied address.")
            (Stind_R8, stind_r8, "stind.r8", 0x57, None, "Stores a value of type float64 at a supplied address.")
            (Add, add, "add", 0x58, None, "Adds two values and pushes the result onto the evaluation stack.")
            (Sub, sub, "sub", 0x59, None, "Subtracts one value from another and pushes the result onto the evaluation stack.")
            (Mul, mul, "mul", 0x5A, None, "Multiplies two values and pushes the result on the evaluation stack.")
            (Div, div, "div", 0x5B, None, "Divides two values and pushes the result as a floating-point (type F) or quotient (type int32) onto the evaluation stack.")
            (Div_Un, div_un, "div.un", 0x5C, None, "Divides two unsigned integer values and pushes the result (int32) onto the evaluation stack.")
            (Rem, rem, "rem", 0x5D, None, "Divides two values and pushes the remainder onto the evaluation stack.")
            (Rem_Un, rem_un, "rem.un", 0x5E, None, "Divides two unsigned values and pushes the remainder onto the evaluation stack.")
            (And, and, "and", 0x5F, None, "Computes the bitwise AND of two values and pushes the result onto the evaluation stack.")
            (Or, or, "or", 0x60, None, "Computes the bitwise complement of the two integer values on top of the stack and pushes the result onto the evaluation stack.")
            (Xor, xor, "xor", 0x61, None, "Computes the bitwise XOR of the top two values on the evaluation stack, pushing the result onto the evaluation stack.")
            (Shl, shl, "shl", 0x62, None, "Shifts an integer value to the left (in zeroes) by a specified number of bits, pushing the result onto the evaluation stack.")
            (Shr, shr, "shr", 0x63, None, "Shifts an integer value (in sign) to the right by a specified number of bits, pushing the result onto the evaluation stack.")
            (Shr_Un, shr_un, "shr.un", 0x64, None, "Shifts an unsigned integer value (in zeroes) to the right by a specified number of bits, pushing the result onto the evaluation stack.")
            (Neg, neg, "neg", 0x65, None, "Negates a value and pushes the result onto the evaluation stack.")
            (Not, not, "not", 0x66, None, "Computes the bitwise complement of the integer value on top of the stack and pushes the result onto the evaluation stack as the same type.")
            (Conv_I1, conv_i1, "conv.i1", 0x67, None, "Converts the value on top of the evaluation stack to int8, then extends (pads) it to int32.")
            (Conv_I2, conv_i2, "conv.i2", 0x68, None, "Converts the value on top of the evaluation stack to int16, then extends (pads) it to int32.")
            (Conv_I4, conv_i4, "conv.i4", 0x69, None, "Converts the value on top of the evaluation stack to int32.")
            (Conv_I8, conv_i8, "conv.i8", 0x6A, None, "Converts the value on top of the evaluation stack to int64.")
            (Conv_R4, conv_r4, "conv.r4", 0x6B, None, "Converts the value on top of the evaluation stack to float32.")
            (Conv_R8, conv_r8, "conv.r8", 0x6C, None, "Converts the value on top of the evaluation stack to float64.")
            (Conv_U4, conv_u4, "conv.u4", 0x6D, None, "Converts the value on top of the evaluation stack to unsigned int32, and extends it to int32.")
            (Conv_U8, conv_u8, "conv.u8", 0x6E, None, "Converts the value on top of the evaluation stack to unsigned int64, and extends it to int64.")
            (Callvirt, callvirt, "callvirt", 0x6F, Method, "Calls a late-bound method on an object, pushing the return value onto the evaluation stack.")
            (Cpobj, cpobj, "cpobj", 0x70, Type, "Copies the value type located at the address of an object to the address of the destination object.")
            (Ldobj, ldobj, "ldobj", 0x71, Type, "Copies the value type object pointed to by an address to the top of the evaluation stack.")
            (Ldstr, ldstr, "ldstr", 0x72, String, "Pushes a new object reference to a string literal stored in the metadata.")
            (Newobj, newobj, "newobj", 0x73, Method, "Creates a new object or a new instance of a value type, pushing an object reference onto the evaluation stack.")
            (Castclass, castclass, "castclass", 0x74, Type, "Attempts to cast an object passed by reference to the specified class.")
            (Isinst, isinst, "isinst", 0x75, Type, "Tests whether an object reference is an instance of a particular class.")
            (Conv_R_Un, conv_r_un, "conv.r.un", 0x76, None, "Converts the unsigned integer value on top of the evaluation stack to float32.")
            (Unbox, unbox, "unbox", 0x79, Type, "Converts the boxed representation of a value type to its unboxed form.")
            (Throw, throw, "throw", 0x7A, None, "Throws the exception object currently on the evaluation stack.")
            (Ldfld, ldfld, "ldfld", 0x7B, Field, "Finds the value of a field in the object whose reference is currently on the evaluation stack.")
            (Ldflda, ldflda, "ldflda", 0x7C, Field, "Finds the address of a field in the object whose reference is currently on the evaluation stack.")
            (Stfld, stfld, "stfld", 0x7D, Field, "Replaces the value stored in the field of an object reference or pointer with a new value.")
            (Ldsfld, ldsfld, "ldsfld", 0x7E, Field, "Pushes the value of a static field onto the evaluation stack.")
            (Ldsflda, ldsflda, "ldsflda", 0x7F, Field, "Pushes the address of a static field onto the evaluation stack.")
            (Stsfld, stsfld, "stsfld", 0x80, Field, "Replaces the value of a static field with a value from the evaluation stack.")
            (Stobj, stobj, "stobj", 0x81, Type, "Copies a value of a specified type from the evaluation stack into a supplied memory address.")
            (Conv_Ovf_I1_Un, conv_ovf_i1_un, "conv.ovf.i1.un", 0x82, None, "Converts the unsigned value on top of the evaluation stack to signed int8 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_I2_Un, conv_ovf_i2_un, "conv.ovf.i2.un", 0x83, None, "Converts the unsigned value on top of the evaluation stack to signed int16 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_I4_Un, conv_ovf_i4_un, "conv.ovf.i4.un", 0x84, None, "Converts the unsigned value on top of the evaluation stack to signed int32, throwing on overflow.")
            (Conv_Ovf_I8_Un, conv_ovf_i8_un, "conv.ovf.i8.un", 0x85, None, "Converts the unsigned value on top of the evaluation stack to signed int64, throwing on overflow.")
            (Conv_Ovf_U1_Un, conv_ovf_u1_un, "conv.ovf.u1.un", 0x86, None, "Converts the unsigned value on top of the evaluation stack to unsigned int8 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_U2_Un, conv_ovf_u2_un, "conv.ovf.u2.un", 0x87, None, "Converts the unsigned value on top of the evaluation stack to unsigned int16 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_U4_Un, conv_ovf_u4_un, "conv.ovf.u4.un", 0x88, None, "Converts the unsigned value on top of the evaluation stack to unsigned int32, throwing on overflow.")
            (Conv_Ovf_U8_Un, conv_ovf_u8_un, "conv.ovf.u8.un", 0x89, None, "Converts the unsigned value on top of the evaluation stack to unsigned int64, throwing on overflow.")
            (Conv_Ovf_I_Un, conv_ovf_i_un, "conv.ovf.i.un", 0x8A, None, "Converts the unsigned value on top of the evaluation stack to signed native int, throwing on overflow.")
            (Conv_Ovf_U_Un, conv_ovf_u_un, "conv.ovf.u.un", 0x8B, None, "Converts the unsigned value on top of the evaluation stack to unsigned native int, throwing on overflow.")
            (Box, box_, "box", 0x8C, Type, "Converts a value type to an object reference (type O).")
            (Newarr, newarr, "newarr", 0x8D, Type, "Pushes an object reference to a new zero-based, one-dimensional array whose elements are of a specific type onto the evaluation stack.")
            (Ldlen, ldlen, "ldlen", 0x8E, None, "Pushes the number of elements of a zero-based, one-dimensional array onto the evaluation stack.")
            (Ldelema, ldelema, "ldelema", 0x8F, Type, "Loads the address of the array element at a specified array index onto the top of the evaluation stack as type & (managed pointer).")
            (Ldelem_I1, ldelem_i1, "ldelem.i1", 0x90, None, "Loads the element with type int8 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_U1, ldelem_u1, "ldelem.u1", 0x91, None, "Loads the element with type unsigned int8 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_I2, ldelem_i2, "ldelem.i2", 0x92, None, "Loads the element with type int16 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_U2, ldelem_u2, "ldelem.u2", 0x93, None, "Loads the element with type unsigned int16 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_I4, ldelem_i4, "ldelem.i4", 0x94, None, "Loads the element with type int32 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_U4, ldelem_u4, "ldelem.u4", 0x95, None, "Loads the element with type unsigned int32 at a specified array index onto the top of the evaluation stack as an int32.")
            (Ldelem_I8, ldelem_i8, "ldelem.i8", 0x96, None, "Loads the element with type int64 at a specified array index onto the top of the evaluation stack as an int64.")
            (Ldelem_I, ldelem_i, "ldelem.i", 0x97, None, "Loads the element with type native int at a specified array index onto the top of the evaluation stack as a native int.")
            (Ldelem_R4, ldelem_r4, "ldelem.r4", 0x98, None, "Loads the element with type float32 at a specified array index onto the top of the evaluation stack as type F (float).")
            (Ldelem_R8, ldelem_r8, "ldelem.r8", 0x99, None, "Loads the element with type float64 at a specified array index onto the top of the evaluation stack as type F (float).")
            (Ldelem_Ref, ldelem_ref, "ldelem.ref", 0x9A, None, "Loads the element containing an object reference at a specified array index onto the top of the evaluation stack as type O (object reference).")
            (Stelem_I, stelem_i, "stelem.i", 0x9B, None, "Replaces the array element at a given index with the native int value on the evaluation stack.")
            (Stelem_I1, stelem_i1, "stelem.i1", 0x9C, None, "Replaces the array element at a given index with the int8 value on the evaluation stack.")
            (Stelem_I2, stelem_i2, "stelem.i2", 0x9D, None, "Replaces the array element at a given index with the int16 value on the evaluation stack.")
            (Stelem_I4, stelem_i4, "stelem.i4", 0x9E, None, "Replaces the array element at a given index with the int32 value on the evaluation stack.")
            (Stelem_I8, stelem_i8, "stelem.i8", 0x9F, None, "Replaces the array element at a given index with the int64 value on the evaluation stack.")
            (Stelem_R4, stelem_r4, "stelem.r4", 0xA0, None, "Replaces the array element at a given index with the float32 value on the evaluation stack.")
            (Stelem_R8, stelem_r8, "stelem.r8", 0xA1, None, "Replaces the array element at a given index with the float64 value on the evaluation stack.")
            (Stelem_Ref, stelem_ref, "stelem.ref", 0xA2, None, "Replaces the array element at a given index with the object ref value (type O) on the evaluation stack.")
            (Ldelem, ldelem, "ldelem", 0xA3, Type, "Loads the element at a specified array index onto the top of the evaluation stack as the type specified in the instruction.")
            (Stelem, stelem, "stelem", 0xA4, Type, "Replaces the array element at a given index with the value on the evaluation stack, whose type is specified in the instruction.")
            (Unbox_Any, unbox_any, "unbox.any", 0xA5, Type, "Converts the boxed representation of a type specified in the instruction to its unboxed form.")
            (Conv_Ovf_I1, conv_ovf_i1, "conv.ovf.i1", 0xB3, None, "Converts the signed value on top of the evaluation stack to signed int8 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_U1, conv_ovf_u1, "conv.ovf.u1", 0xB4, None, "Converts the signed value on top of the evaluation stack to unsigned int8 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_I2, conv_ovf_i2, "conv.ovf.i2", 0xB5, None, "Converts the signed value on top of the evaluation stack to signed int16 and extending it to int32, throwing on overflow.")
            (Conv_Ovf_U2, conv_ovf_u2, "conv.ovf.u2", 0xB6, None, "Converts the signed value on top of the evaluation stack to unsigned int16 and extends it to int32, throwing on overflow.")
            (Conv_Ovf_I4, conv_ovf_i4, "conv.ovf.i4", 0xB7, None, "Converts the signed value on top of the evaluation stack to signed int32, throwing on overflow.")
            (Conv_Ovf_U4, conv_ovf_u4, "conv.ovf.u4", 0xB8, None, "Converts the signed value on top of the evaluation stack to unsigned int32, throwing on overflow.")
            (Conv_Ovf_I8, conv_ovf_i8, "conv.ovf.i8", 0xB9, None, "Converts the signed value on top of the evaluation stack to signed int64, throwing on overflow.")
            (Conv_Ovf_U8, conv_ovf_u8, "conv.ovf.u8", 0xBA, None, "Converts the signed value on top of the evaluation stack to unsigned int64, throwing on overflow.")
            (Refanyval, refanyval, "refanyval", 0xC2, Type, "Retrieves the address (type &) embedded in a typed reference.")
            (Ckfinite, ckfinite, "ckfinite", 0xC3, None, "Throws an arithmetic error if the value is not a finite number.")
            (Mkrefany, mkrefany, "mkrefany", 0xC6, Type, "Pushes a typed reference to an instance of a specific type onto the evaluation stack.")
            (Ldtoken, ldtoken, "ldtoken", 0xD0, Token, "Converts a metadata token to its runtime representation, pushing it onto the evaluation stack.")
            (Conv_U2, conv_u2, "conv.u2", 0xD1, None, "Converts the value on top of the evaluation stack to unsigned int16, and extends it to int32.")
            (Conv_U1, conv_u1, "conv.u1", 0xD2, None, "Converts the value on top of the evaluation stack to unsigned int8, and extends it to int32.")
            (Conv_I, conv_i, "conv.i", 0xD3, None, "Converts the value on top of the evaluation stack to native int.")
            (Conv_Ovf_I, conv_ovf_i, "conv.ovf.i", 0xD4, None, "Converts the signed value on top of the evaluation stack to signed native int, throwing on overflow.")
            (Conv_Ovf_U, conv_ovf_u, "conv.ovf.u", 0xD5, None, "Converts the signed value on top of the evaluation stack to unsigned native int, throwing on overflow.")
            (Add_Ovf, add_ovf, "add.ovf", 0xD6, None, "Adds two integers, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Add_Ovf_Un, add_ovf_un, "add.ovf.un", 0xD7, None, "Adds two unsigned integer values, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Mul_Ovf, mul_ovf, "mul.ovf", 0xD8, None, "Multiplies two integer values, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Mul_Ovf_Un, mul_ovf_un, "mul.ovf.un", 0xD9, None, "Multiplies two unsigned integer values, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Sub_Ovf, sub_ovf, "sub.ovf", 0xDA, None, "Subtracts one integer value from another, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Sub_Ovf_Un, sub_ovf_un, "sub.ovf.un", 0xDB, None, "Subtracts one unsigned integer value from another, performs an overflow check, and pushes the result onto the evaluation stack.")
            (Endfinally, endfinally, "endfinally", 0xDC, None, "Transfers control from the fault or finally clause of an exception block back to the exception handler.")
            (Leave, leave, "leave", 0xDD, Branch, "Exits a protected region of code, unconditionally transferring control to a specific target instruction.")
            (Leave_S, leave_s, "leave.s", 0xDE, ShortBranch, "Exits a protected region of code, unconditionally transferring control to a target instruction (short form).")
            (Stind_I, stind_i, "stind.i", 0xDF, None, "Stores a value of type native int at a supplied address.")
            (Conv_U, conv_u, "conv.u", 0xE0, None, "Converts the value on top of the evaluation stack to unsigned native int, and extends it to native int.")
            (Arglist, arglist, "arglist", 0xFE00, None, "Returns an unmanaged pointer to the argument list of the current method.")
            (Ceq, ceq, "ceq", 0xFE01, None, "Compares two values. If they are equal, the integer value 1 (int32) is pushed onto the evaluation stack; otherwise 0 (int32) is pushed.")
            (Cgt, cgt, "cgt", 0xFE02, None, "Compares two values. If the first value is greater than the second, 1 (int32) is pushed onto the evaluation stack; otherwise 0 (int32) is pushed.")
            (Cgt_Un, cgt_un, "cgt.un", 0xFE03, None, "Compares two unsigned or unordered values. If the first value is greater than the second, 1 (int32) is pushed; otherwise 0 (int32) is pushed.")
            (Clt, clt, "clt", 0xFE04, None, "Compares two values. If the first value is less than the second, 1 (int32) is pushed onto the evaluation stack; otherwise 0 (int32) is pushed.")
            (Clt_Un, clt_un, "clt.un", 0xFE05, None, "Compares the unsigned or unordered values. If the first value is less than the second, 1 (int32) is pushed; otherwise 0 (int32) is pushed.")
            (Ldftn, ldftn, "ldftn", 0xFE06, Method, "Pushes an unmanaged pointer (type native int) to the native code implementing a specific method onto the evaluation stack.")
            (Ldvirtftn, ldvirtftn, "ldvirtftn", 0xFE07, Method, "Pushes an unmanaged pointer (type native int) to the native code implementing a particular virtual method associated with a specified object onto the evaluation stack.")
            (Ldarg, ldarg, "ldarg", 0xFE09, Var, "Loads an argument (referenced by a specified index value) onto the stack.")
            (Ldarga, ldarga, "ldarga", 0xFE0A, Var, "Loads an argument address onto the evaluation stack.")
            (Starg, starg, "starg", 0xFE0B, Var, "Stores the value on top of the evaluation stack in the argument slot at a specified index.")
            (Ldloc, ldloc, "ldloc", 0xFE0C, Var, "Loads the local variable at a specific index onto the evaluation stack.")
            (Ldloca, ldloca, "ldloca", 0xFE0D, Var, "Loads the address of the local variable at a specific index onto the evaluation stack.")
            (Stloc, stloc, "stloc", 0xFE0E, Var, "Pops the current value from the top of the evaluation stack and stores it in the local variable list at a specified index.")
            (Localloc, localloc, "localloc", 0xFE0F, None, "Allocates a certain number of bytes from the local dynamic memory pool and pushes the address of the first allocated byte onto the evaluation stack.")
            (Endfilter, endfilter, "endfilter", 0xFE11, None, "Transfers control from the filter clause of an exception back to the exception handler.")
            (Unaligned, unaligned, "unaligned.", 0xFE12, U8, "Indicates that an address currently atop the evaluation stack might not be aligned to the natural size of the immediately following instruction.")
            (Volatile, volatile, "volatile.", 0xFE13, None, "Specifies that an address currently atop the evaluation stack might be volatile.")
            (Tailcall, tailcall, "tail.", 0xFE14, None, "Performs a postfixed method call instruction such that the current method's stack frame is removed before the actual call instruction is executed.")
            (Initobj, initobj, "initobj", 0xFE15, Type, "Initializes each field of the value type at a specified address to a null reference or a 0 of the appropriate primitive type.")
            (Constrained, constrained, "constrained.", 0xFE16, Type, "Constrains the type on which a virtual method call is made.")
            (Cpblk, cpblk, "cpblk", 0xFE17, None, "Copies a specified number of bytes from a source address to a destination address.")
            (Initblk, initblk, "initblk", 0xFE18, None, "Initializes a specified block of memory at a specific address to a given size and initial value.")
            (No, no, "no.", 0xFE19, U8, "Indicates that the subsequent instruction need not perform the specified fault check when it is executed.")
            (Rethrow, rethrow, "rethrow", 0xFE1A, None, "Rethrows the current exception.")
            (Sizeof, sizeof, "sizeof", 0xFE1C, Type, "Pushes the size, in bytes, of a supplied value type onto the evaluation stack.")
            (Refanytype, refanytype, "refanytype", 0xFE1D, None, "Retrieves the type token embedded in a typed reference.")
            (Readonly, readonly, "readonly.", 0xFE1E, None, "Specifies that the subsequent array address operation performs no type check at run time, and that it returns a managed pointer whose mutability is restricted.")
        }
    };
}

macro_rules! define_opcode_enum {
    ($( ($variant:ident, $method:ident, $mnemonic:literal, $code:literal, $kind:ident, $doc:literal) )*) => {
        /// One CIL instruction kind.
        #[allow(non_camel_case_types)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub enum OpCode {
            $( #[doc = $doc] $variant, )*
        }

        impl OpCode {
            /// Every opcode, in table order.
            pub const ALL: &'static [OpCode] = &[ $( OpCode::$variant, )* ];

            /// Textual mnemonic (`"ldc.i4.s"`).
            pub const fn mnemonic(self) -> &'static str {
                match self { $( OpCode::$variant => $mnemonic, )* }
            }

            /// Encoded value; two-byte opcodes carry `0xFE` in the high byte.
            pub const fn value(self) -> u16 {
                match self { $( OpCode::$variant => $code, )* }
            }

            /// Inline operand shape.
            pub const fn operand_kind(self) -> OperandKind {
                match self { $( OpCode::$variant => OperandKind::$kind, )* }
            }

            /// One-line description.
            pub const fn description(self) -> &'static str {
                match self { $( OpCode::$variant => $doc, )* }
            }

            /// Reverse lookup from the encoded value.
            pub const fn from_value(value: u16) -> Option<OpCode> {
                match value {
                    $( $code => Some(OpCode::$variant), )*
                    _ => None,
                }
            }

            /// Reverse lookup from the mnemonic (case-insensitive).
            pub fn from_mnemonic(text: &str) -> Option<OpCode> {
                let lowered = text.to_ascii_lowercase();
                match lowered.as_str() {
                    $( $mnemonic => Some(OpCode::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_opcode!(define_opcode_enum);

impl OpCode {
    /// Size in bytes of the opcode itself (1, or 2 with the `0xFE` prefix).
    pub const fn opcode_size(self) -> u32 {
        if self.value() > 0xFF { 2 } else { 1 }
    }

    /// Size of the encoded instruction, opcode and operand included, for a
    /// jump table of `targets` entries (ignored by non-`switch` opcodes).
    pub const fn encoded_size(self, targets: u32) -> u32 {
        let base = self.opcode_size() + self.operand_kind().inline_size();
        if matches!(self, OpCode::Switch) { base + 4 * targets } else { base }
    }

    /// Prefix opcodes modify the instruction that follows them.
    pub const fn is_prefix(self) -> bool {
        matches!(
            self,
            OpCode::Unaligned
                | OpCode::Volatile
                | OpCode::Tailcall
                | OpCode::Constrained
                | OpCode::No
                | OpCode::Readonly
        )
    }

    /// Instructions after which control never falls through.
    pub const fn ends_block(self) -> bool {
        matches!(
            self,
            OpCode::Ret
                | OpCode::Br
                | OpCode::Br_S
                | OpCode::Leave
                | OpCode::Leave_S
                | OpCode::Throw
                | OpCode::Rethrow
                | OpCode::Jmp
                | OpCode::Endfinally
                | OpCode::Endfilter
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
