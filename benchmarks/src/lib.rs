//! Corps de référence partagés par les benchmarks.

use ilforge_emit::Il;

/// `sum(n) = n + (n-1) + … + 1` sur l'argument 0 (statique).
pub fn sum_loop(il: &mut Il<'_>) {
    let (il, acc) = il.declare_local_of::<i32>();
    let (il, top) = il.ldc_i4_0().stloc_local(acc).mark_fresh_label();
    let (il, done) = il.ldarg_0().branch_fresh(Il::brfalse_s);
    il.ldloc_local(acc).ldarg_0().add().stloc_local(acc);
    il.ldarg_0().ldc_i4_1().sub().starg_x(0).br_s(top);
    il.mark_label(done).ldloc_local(acc).ret();
}

/// Table de saut à `n` cas, chacun chargeant son index.
pub fn jump_table(il: &mut Il<'_>, cases: usize) {
    let labels: Vec<_> = (0..cases).map(|_| il.define_label()).collect();
    il.ldarg_0().switch(&labels).ldc_i4_m1().ret();
    for (i, label) in labels.into_iter().enumerate() {
        il.mark_label(label).ldc_i4_x(i32::try_from(i).unwrap_or(i32::MAX)).ret();
    }
}
