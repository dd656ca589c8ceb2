//! Listings read from disk, as the `ilforge` binary does.

use std::fs;

use ilforge_host::{ExecError, HostError, HostOptions, Value};
use ilforge_tools::{assemble_listing, read_source, render, run_listing, AsmFormat, Input, RunTask};
use pretty_assertions::assert_eq;

const SUM_TO_N: &str = "
; sum 1..=n
.local int32
    ldc.i4.0
    stloc.0
top:
    ldarg.0
    brfalse.s done
    ldloc.0
    ldarg.0
    add
    stloc.0
    ldarg.0
    ldc.i4.1
    sub
    starg.s 0
    br.s top
done:
    ldloc.0
    ret
";

fn write_listing(dir: &tempfile::TempDir, name: &str, text: &str) -> Input {
    let path = dir.path().join(name);
    fs::write(&path, text).expect("write listing");
    Input::Path(path)
}

#[test]
fn assembles_and_runs_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_listing(&dir, "sum.il", SUM_TO_N);
    let source = read_source(&input).expect("read");

    let out = run_listing(&source, &RunTask { args: vec![10], ..RunTask::default() }).expect("run");
    assert_eq!(out, Value::I32(55));

    let body = assemble_listing(&source).expect("assemble");
    let listing = render(&body, &input.display_name(), AsmFormat::Disasm).expect("disasm");
    assert!(listing.contains("sum.il"));
    assert!(listing.contains(";; locals"));
    assert!(listing.contains("brfalse.s"));
}

#[test]
fn compact_listing_reassembles_to_the_same_code() {
    let body = assemble_listing(SUM_TO_N).expect("assemble");
    let compact = render(&body, "sum", AsmFormat::Compact).expect("compact");
    let mnemonics: Vec<&str> = compact
        .lines()
        .filter_map(|l| l.split_once(": ").map(|(_, rest)| rest.split_whitespace().next().unwrap_or("")))
        .collect();
    assert_eq!(mnemonics.first().copied(), Some("ldc.i4.0"));
    assert_eq!(mnemonics.last().copied(), Some("ret"));
    assert_eq!(mnemonics.len(), body.decode().expect("decode").len());
}

#[test]
fn missing_file_mentions_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.il");
    let err = read_source(&Input::Path(missing)).unwrap_err();
    assert!(format!("{err:#}").contains("nope.il"));
}

#[test]
fn assembler_errors_carry_the_line() {
    let err = assemble_listing("nop\nfrobnicate\nret").unwrap_err();
    assert!(format!("{err:#}").contains('2'), "{err:#}");
}

#[test]
fn step_limit_from_options() {
    let task = RunTask { options: HostOptions::default().with_max_steps(100), ..RunTask::default() };
    let err = run_listing("top:\n  br.s top", &task).unwrap_err();
    let host = err.downcast_ref::<HostError>().expect("host error");
    assert!(matches!(host, HostError::Exec(ExecError::StepLimit(100))));
}
