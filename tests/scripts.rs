//! End-to-end tests: run the `atto` binary against the checked-in scripts in
//! `tests/scripts/` and check what lands on stdout and stderr.
//!
//! Exit codes follow sysexits: 65 for a compile error, 70 for a runtime
//! error.

use assert_cmd::Command;
use predicates::prelude::*;

fn atto() -> Command {
    Command::cargo_bin("atto").expect("the atto binary should be built")
}

fn script(name: &str) -> String {
    format!("{}/tests/scripts/{name}", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn arithmetic_prints_numbers_without_trailing_zeroes() {
    atto()
        .arg(script("arithmetic.atto"))
        .assert()
        .success()
        .stdout("7\n9\n2.5\n-3\n");
}

#[test]
fn an_inner_declaration_shadows_without_clobbering() {
    atto()
        .arg(script("shadowing.atto"))
        .assert()
        .success()
        .stdout("11\n10\n");
}

#[test]
fn while_loops_count_upwards() {
    atto()
        .arg(script("while_loop.atto"))
        .assert()
        .success()
        .stdout("0\n1\n2\n");
}

#[test]
fn for_loops_count_upwards() {
    atto()
        .arg(script("for_loop.atto"))
        .assert()
        .success()
        .stdout("0\n1\n2\n");
}

#[test]
fn logical_operators_compose_with_comparisons() {
    atto()
        .arg(script("logic.atto"))
        .assert()
        .success()
        .stdout("ok\n");
}

#[test]
fn equality_is_defined_across_all_types() {
    atto()
        .arg(script("equality.atto"))
        .assert()
        .success()
        .stdout("false\ntrue\nfalse\ntrue\n");
}

#[test]
fn plus_concatenates_strings() {
    atto()
        .arg(script("concat.atto"))
        .assert()
        .success()
        .stdout("concat!\n");
}

#[test]
fn short_circuits_never_run_their_right_operand() {
    atto()
        .arg(script("short_circuit.atto"))
        .assert()
        .success()
        .stdout("1\n1\n");
}

#[test]
fn reading_a_local_in_its_own_initializer_is_a_compile_error() {
    atto()
        .arg(script("self_initializer.atto"))
        .assert()
        .code(65)
        .stdout("")
        .stderr(predicate::str::contains("its own initializer"));
}

#[test]
fn duplicate_locals_in_one_scope_are_a_compile_error() {
    atto()
        .arg(script("duplicate_local.atto"))
        .assert()
        .code(65)
        .stderr(predicate::str::contains("already exists in this scope"));
}

#[test]
fn undefined_globals_fail_at_runtime() {
    atto()
        .arg(script("undefined_variable.atto"))
        .assert()
        .code(70)
        .stderr(
            predicate::str::contains("Undefined variable 'x'")
                .and(predicate::str::contains("[line 1] in script")),
        );
}

#[test]
fn mixed_type_addition_fails_at_runtime() {
    atto()
        .arg(script("add_mismatch.atto"))
        .assert()
        .code(70)
        .stderr(predicate::str::contains("Can only add numbers or strings"));
}

#[test]
fn redefining_a_global_fails_at_runtime() {
    atto()
        .arg(script("redefined_global.atto"))
        .assert()
        .code(70)
        .stderr(predicate::str::contains("already defined"));
}

#[test]
fn a_missing_script_file_exits_with_an_io_error() {
    atto()
        .arg(script("no_such_script.atto"))
        .assert()
        .code(74)
        .stderr(predicate::str::contains("Could not read"));
}

#[test]
fn compile_diagnostics_name_the_offending_token() {
    atto()
        .arg(script("duplicate_local.atto"))
        .assert()
        .code(65)
        .stderr(predicate::str::contains("<Line 3> Error at"));
}
