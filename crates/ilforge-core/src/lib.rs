//! ilforge-core — table d'instructions CIL et corps de méthode
//!
//! Fournit :
//! - `OpCode` / `OperandKind` générés depuis la table unique [`for_each_opcode!`]
//! - `MethodBody` : sink d'instructions append-only, labels, locals, erreurs différées
//! - `SealedBody` : encodage binaire (fixups de branches, table de tokens), décodage
//! - Références de métadonnées : `TypeRef`, `MethodRef`, `FieldRef`, `CallSite`, `Token`
//! - IO mémoire (little-endian) : `ByteWriter`, `ByteReader` (via `byteorder`)
//! - Désassembleur, assembleur texte, validation structurelle
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `std` (par défaut) : emplacement de compatibilité, ne conditionne aucun
//!   code ; le crate exige toujours la bibliothèque standard (pas de `no_std`).
//! - `serde` : derive (dé)sérialisation sur les structures utiles

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Instructions : table d'opcodes, corps de méthode, encodage, outils texte.
pub mod bytecode;
/// Références de métadonnées portées par les opérandes.
pub mod meta;

/// Raccourci : validation structurelle des corps scellés.
pub use bytecode::helpers;
/// Raccourci : désassembleur textuel.
pub use bytecode::disasm;
/// Raccourci : assembleur texte.
pub use bytecode::asm;

pub use bytecode::{
    BodyId, Decoded, EmitError, Instr, Label, Local, LocalSlot, MetaEntry, MethodBody, OpCode,
    Operand, OperandKind, RawOperand, SealedBody, TokenKind,
};
pub use meta::{CallConv, CallSite, FieldRef, MethodRef, Object, Signature, StaticType, Token, TypeRef};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/// Identifiant simple (nom de type, de méthode, de champ).
pub type Ident = String;

/// Construit un identifiant.
pub fn ident<S: Into<String>>(s: S) -> Ident { s.into() }

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d'écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

macro_rules! write_le {
    ($($name:ident($ty:ty, $n:literal, $f:ident)),* $(,)?) => {
        $(
            #[doc = concat!("Écrit un `", stringify!($ty), "` little-endian.")]
            pub fn $name(&mut self, v: $ty) {
                let mut b = [0u8; $n];
                LittleEndian::$f(&mut b, v);
                self.buf.extend_from_slice(&b);
            }
        )*
    };
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Taille actuelle.
    pub fn len(&self) -> usize { self.buf.len() }
    /// Vrai si rien n'a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un octet.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un octet signé.
    pub fn write_i8(&mut self, v: i8) { self.buf.push(v.to_le_bytes()[0]); }
    /// Écrit un u16 big-endian (opcodes préfixés `0xFE`).
    pub fn write_u16_be(&mut self, v: u16) {
        let mut b = [0u8; 2];
        BigEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    write_le! {
        write_u16_le(u16, 2, write_u16),
        write_u32_le(u32, 4, write_u32),
        write_i32_le(i32, 4, write_i32),
        write_i64_le(i64, 8, write_i64),
        write_f32_le(f32, 4, write_f32),
        write_f64_le(f64, 8, write_f64),
    }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d'octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

macro_rules! read_le {
    ($($name:ident($ty:ty, $n:literal, $f:ident)),* $(,)?) => {
        $(
            #[doc = concat!("Lit un `", stringify!($ty), "` little-endian.")]
            pub fn $name(&mut self) -> CoreResult<$ty> {
                Ok(LittleEndian::$f(self.read_bytes($n)?))
            }
        )*
    };
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::UnexpectedEof { needed: n as u64, at: self.off as u64 });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> CoreResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un octet signé.
    pub fn read_i8(&mut self) -> CoreResult<i8> { Ok(i8::from_le_bytes([self.read_u8()?])) }

    read_le! {
        read_u16_le(u16, 2, read_u16),
        read_u32_le(u32, 4, read_u32),
        read_i32_le(i32, 4, read_i32),
        read_i64_le(i64, 8, read_i64),
        read_f32_le(f32, 4, read_f32),
        read_f64_le(f64, 8, read_f64),
    }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Fin de buffer inattendue.
    #[error("unexpected EOF: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Nombre d'octets manquants.
        needed: u64,
        /// Offset où l'erreur s'est produite.
        at: u64,
    },
    /// Valeur d'opcode inconnue.
    #[error("unknown opcode 0x{value:02X} at IL_{at:04x}")]
    UnknownOpcode {
        /// Valeur lue.
        value: u16,
        /// Offset de l'instruction.
        at: u32,
    },
    /// Token absent de la table ou de mauvais genre.
    #[error("invalid metadata token 0x{token:08X}")]
    InvalidToken {
        /// Token brut.
        token: u32,
    },
    /// Cible de branche hors du flux.
    #[error("branch at IL_{at:04x} targets {target}")]
    InvalidBranch {
        /// Offset de l'instruction.
        at: u32,
        /// Cible calculée.
        target: i64,
    },
    /// Corps structurellement invalide.
    #[error("invalid body at IL_{at:04x}: {reason}")]
    InvalidBody {
        /// Offset de l'instruction fautive.
        at: u32,
        /// Description.
        reason: String,
    },
    /// Erreur d'assemblage texte.
    #[error("line {line}: {message}")]
    Asm {
        /// Ligne (1-based).
        line: usize,
        /// Description.
        message: String,
    },
    /// Défaut structurel à la construction.
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// Données corrompues.
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
}

impl CoreError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { CoreError::Corrupted(msg.into()) }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        ident, BodyId, ByteReader, ByteWriter, CallConv, CallSite, CoreError, CoreResult, EmitError,
        FieldRef, Ident, Label, Local, MethodBody, MethodRef, OpCode, Operand, OperandKind,
        SealedBody, Signature, StaticType, Token, TypeRef,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_le() -> CoreResult<()> {
        let mut w = ByteWriter::new();
        w.write_u16_le(0xBEEF);
        w.write_u32_le(0xDEAD_BEEF);
        w.write_i64_le(-42);
        w.write_f64_le(3.5);
        w.write_i8(-2);
        w.write_u16_be(0xFE01);

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u16_le()?, 0xBEEF);
        assert_eq!(r.read_u32_le()?, 0xDEAD_BEEF);
        assert_eq!(r.read_i64_le()?, -42);
        assert_eq!(r.read_f64_le()?, 3.5);
        assert_eq!(r.read_i8()?, -2);
        assert_eq!(r.read_bytes(2)?, &[0xFE, 0x01]);
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn eof_is_an_error() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(r.read_u32_le(), Err(CoreError::UnexpectedEof { needed: 4, at: 0 }));
    }
}
