//! End-to-end tests: compile FullCircle source and execute it on the VM,
//! asserting on the printed output.

use fc_vm::{Step, Vm, VmError};

fn run_source(source: &str) -> (Result<(), VmError>, Vec<String>) {
    let code = fcc::compile_source(source).expect("program should compile");
    let mut vm = Vm::with_output(code, Vec::new());
    let result = vm.run(65536);
    let output = String::from_utf8(vm.into_output()).unwrap();
    (result, output.lines().map(str::to_string).collect())
}

fn output_of(source: &str) -> Vec<String> {
    let (result, output) = run_source(source);
    assert!(result.is_ok(), "program faulted: {:?}", result);
    output
}

#[test]
fn backtick_prints_a_sum() {
    assert_eq!(output_of("void main() { `1 + 2; }"), ["3"]);
}

#[test]
fn function_calls_pass_arguments_and_return_values() {
    let source = "int add(int a, int b) { return a + b; } \
                  void main() { `add(40, 2); }";
    assert_eq!(output_of(source), ["42"]);
}

#[test]
fn while_loops_iterate() {
    let source = "void main() { int i; i = 0; while (i < 3) { `i; i = i + 1; } }";
    assert_eq!(output_of(source), ["0", "1", "2"]);
}

#[test]
fn if_else_takes_the_right_branch() {
    let source = "void main() { int x; x = 10; if (x > 5) `1; else `0; }";
    assert_eq!(output_of(source), ["1"]);

    let source = "void main() { int x; x = 3; if (x > 5) `1; else `0; }";
    assert_eq!(output_of(source), ["0"]);
}

#[test]
fn recursion_works_through_the_calling_convention() {
    let source = "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } \
                  void main() { `fact(5); }";
    assert_eq!(output_of(source), ["120"]);
}

#[test]
fn float_arithmetic_prints_with_a_decimal_point() {
    let source = "void main() { float f; f = 1.5; `f + 2.5; }";
    assert_eq!(output_of(source), ["4.0"]);
}

#[test]
fn constants_round_trip_through_print() {
    assert_eq!(output_of("void main() { `7; }"), ["7"]);
    assert_eq!(output_of("void main() { `1.5; }"), ["1.5"]);
    // char prints its numeric byte value
    assert_eq!(output_of("void main() { `'a'; }"), ["97"]);
    assert_eq!(output_of("void main() { `0x2a; }"), ["42"]);
    assert_eq!(output_of("void main() { `052; }"), ["42"]);
}

#[test]
fn globals_initialize_in_declaration_order() {
    let source = "int a = 10; int b = a + 5; \
                  void main() { `a; `b; }";
    assert_eq!(output_of(source), ["10", "15"]);
}

#[test]
fn functions_read_and_write_globals() {
    let source = "int counter = 0; \
                  void bump() { counter = counter + 1; } \
                  void main() { bump(); bump(); `counter; }";
    assert_eq!(output_of(source), ["2"]);
}

#[test]
fn for_loops_run_the_step_after_the_body() {
    let source = "void main() { int i; for (i = 0; i < 3; i = i + 1) `i; }";
    assert_eq!(output_of(source), ["0", "1", "2"]);
}

#[test]
fn for_init_may_declare_its_variable() {
    let source = "void main() { for (int i = 0; i < 2; i = i + 1) `i; }";
    assert_eq!(output_of(source), ["0", "1"]);
}

#[test]
fn compound_assignment_updates_in_place() {
    let source = "void main() { int x; x = 10; x += 5; x <<= 1; `x; }";
    assert_eq!(output_of(source), ["30"]);
}

#[test]
fn unary_operators_evaluate() {
    assert_eq!(output_of("void main() { `-5; }"), ["-5"]);
    assert_eq!(output_of("void main() { `!0; }"), ["1"]);
    assert_eq!(output_of("void main() { `~0; }"), ["-1"]);
    assert_eq!(output_of("void main() { `-1.5; }"), ["-1.5"]);
}

#[test]
fn assignment_is_an_expression() {
    let source = "void main() { int x, y; y = (x = 3) + 1; `x; `y; }";
    assert_eq!(output_of(source), ["3", "4"]);
}

#[test]
fn comma_evaluates_both_and_keeps_the_right() {
    let source = "void main() { int x; x = (`1, 2); `x; }";
    assert_eq!(output_of(source), ["1", "2"]);
}

#[test]
fn blocks_scope_and_shadow_variables() {
    let source = "void main() { int x; x = 1; { char x; x = 'a'; `x; } `x; }";
    assert_eq!(output_of(source), ["97", "1"]);
}

#[test]
fn char_arithmetic_wraps_mod_256() {
    let source = "void main() { char c; c = 200; `c + 100; }";
    assert_eq!(output_of(source), ["44"]);
}

#[test]
fn logic_produces_char_flags() {
    let source = "void main() { `(1 < 2) && (2 < 3); }";
    assert_eq!(output_of(source), ["1"]);
    let source = "void main() { `(1.5 > 2.5) || (1 == 1); }";
    assert_eq!(output_of(source), ["1"]);
}

#[test]
fn bitwise_operators_evaluate() {
    assert_eq!(output_of("void main() { `(6 & 3); }"), ["2"]);
    assert_eq!(output_of("void main() { `(6 | 3); }"), ["7"]);
    assert_eq!(output_of("void main() { `(6 ^ 3); }"), ["5"]);
    assert_eq!(output_of("void main() { `(1 << 4); }"), ["16"]);
    assert_eq!(output_of("void main() { `(16 >> 2); }"), ["4"]);
}

#[test]
fn main_may_return_explicitly() {
    let source = "void main() { `1; return; `2; }";
    assert_eq!(output_of(source), ["1"]);
}

#[test]
fn early_returns_skip_the_rest_of_the_function() {
    let source = "int pick(int n) { if (n > 0) return 1; return 0; } \
                  void main() { `pick(5); `pick(-5); }";
    assert_eq!(output_of(source), ["1", "0"]);
}

#[test]
fn void_functions_without_return_still_come_back() {
    let source = "int hits = 0; \
                  void mark() { hits = hits + 1; } \
                  void main() { mark(); mark(); mark(); `hits; }";
    assert_eq!(output_of(source), ["3"]);
}

#[test]
fn mutual_calls_to_earlier_functions_work() {
    let source = "int double(int n) { return n + n; } \
                  int quad(int n) { return double(double(n)); } \
                  void main() { `quad(5); }";
    assert_eq!(output_of(source), ["20"]);
}

#[test]
fn integer_division_by_zero_faults_at_runtime() {
    let (result, output) = run_source("void main() { int z; z = 0; `10 / z; }");
    assert!(matches!(result, Err(VmError::DivisionByZero)));
    assert!(output.is_empty());
}

#[test]
fn float_division_by_zero_is_quiet() {
    let source = "void main() { float z; z = 0.0; `1.0 / z; }";
    assert_eq!(output_of(source), ["inf"]);
}

#[test]
fn deep_recursion_overflows_a_tiny_stack() {
    let source = "int down(int n) { if (n == 0) return 0; return down(n - 1); } \
                  void main() { `down(10000); }";
    let code = fcc::compile_source(source).unwrap();
    let mut vm = Vm::with_output(code, Vec::new());
    assert!(matches!(vm.run(256), Err(VmError::StackOverflow)));
}

#[test]
fn graceful_programs_end_with_an_empty_stack() {
    let source = "int g = 7; \
                  int twice(int n) { return n + n; } \
                  void main() { int x; x = twice(g); `x; }";
    let code = fcc::compile_source(source).unwrap();
    let mut vm = Vm::with_output(code, Vec::new());
    vm.start(65536);
    loop {
        match vm.step() {
            Ok(Step::Running) => {}
            Ok(Step::Terminated) => break,
            Err(e) => panic!("fault: {}", e),
        }
    }
    assert_eq!(vm.sp(), 0);
    vm.stop();
}

#[test]
fn bytecode_survives_a_bincode_round_trip() {
    let code = fcc::compile_source("void main() { `1 + 2; }").unwrap();
    let bytes = bincode::serialize(&code).unwrap();
    let restored: Vec<fc_core::Instr> = bincode::deserialize(&bytes).unwrap();
    assert_eq!(code, restored);

    let mut vm = Vm::with_output(restored, Vec::new());
    vm.run(65536).unwrap();
    assert_eq!(String::from_utf8(vm.into_output()).unwrap().trim(), "3");
}
