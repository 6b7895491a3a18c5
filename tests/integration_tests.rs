// Front-end robustness tests for the Lox interpreter
//
// Every case runs source through the scanner, parser and resolver and checks
// whether compilation succeeds, and if not, that some diagnostic mentions the
// expected text. Panics are caught and reported as crashes.

use lox::error::LoxError;
use lox::runner;

/// Test result for a single test case
#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail(String),
    Crash(String),
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub should_succeed: bool,
    pub expected_error_contains: Option<String>,
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    /// Run all tests in this suite
    pub fn run(&self) -> TestSuiteResults {
        let mut results = TestSuiteResults::new(&self.name);

        println!("Running test suite: {}", self.name);
        println!("{}", "=".repeat(50));

        for test in &self.tests {
            let result = run_single_test(test);
            results.add_result(&test.name, result);
        }

        results.print_summary();
        results
    }
}

/// Results for a test suite run
#[derive(Debug)]
pub struct TestSuiteResults {
    pub suite_name: String,
    pub results: Vec<(String, TestResult)>,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
}

impl TestSuiteResults {
    pub fn new(suite_name: &str) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            results: Vec::new(),
            passed: 0,
            failed: 0,
            crashed: 0,
        }
    }

    pub fn add_result(&mut self, test_name: &str, result: TestResult) {
        match &result {
            TestResult::Pass => {
                self.passed += 1;
                println!("  ✓ {}", test_name);
            }
            TestResult::Fail(msg) => {
                self.failed += 1;
                println!("  ✗ {}: {}", test_name, msg);
            }
            TestResult::Crash(msg) => {
                self.crashed += 1;
                println!("  💥 {}: CRASHED - {}", test_name, msg);
            }
        }
        self.results.push((test_name.to_string(), result));
    }

    pub fn print_summary(&self) {
        println!();
        println!("Test Suite: {} - Summary", self.suite_name);
        println!("{}", "-".repeat(30));
        println!("Passed:  {}", self.passed);
        println!("Failed:  {}", self.failed);
        println!("Crashed: {}", self.crashed);
        println!("Total:   {}", self.results.len());
        println!();
    }

    pub fn is_all_passed(&self) -> bool {
        self.crashed == 0 && self.failed == 0
    }
}

/// Run a single test case
fn run_single_test(test: &TestCase) -> TestResult {
    let result = std::panic::catch_unwind(|| compile_input(&test.input));

    match result {
        Ok(compile_result) => match (compile_result, test.should_succeed) {
            (Ok(()), true) => TestResult::Pass,
            (Ok(()), false) => {
                TestResult::Fail("Expected compilation to fail, but it succeeded".to_string())
            }
            (Err(errors), false) => match &test.expected_error_contains {
                Some(expected) if !errors.iter().any(|e| e.message.contains(expected)) => {
                    let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
                    TestResult::Fail(format!(
                        "No error message in {:?} contains expected text '{}'",
                        messages, expected
                    ))
                }
                _ => TestResult::Pass,
            },
            (Err(errors), true) => TestResult::Fail(format!(
                "Expected compilation to succeed, but got error: {}",
                errors[0]
            )),
        },
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic".to_string()
            };
            TestResult::Crash(panic_msg)
        }
    }
}

/// Scan, parse and resolve, keeping only the diagnostics
fn compile_input(input: &str) -> Result<(), Vec<LoxError>> {
    runner::compile(input).map(|_| ())
}

/// Test case builder for convenience
impl TestCase {
    pub fn should_succeed(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: true,
            expected_error_contains: None,
        }
    }

    pub fn should_fail(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: None,
        }
    }

    pub fn should_fail_with_message(name: &str, input: &str, expected_msg: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: Some(expected_msg.to_string()),
        }
    }
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_lexical_tests() -> TestSuite {
    let mut suite = TestSuite::new("Lexical Errors");

    suite.add_test(TestCase::should_fail_with_message(
        "unterminated_string",
        "print \"never closed;",
        "Unterminated string.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unexpected_character",
        "var a = 1 @ 2;",
        "Unexpected character '@'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unterminated_block_comment",
        "print 1; /* open /* nested */",
        "Unterminated block comment.",
    ));
    suite.add_test(TestCase::should_succeed(
        "nested_block_comments",
        "/* outer /* inner */ still comment */ print 1;",
    ));
    suite.add_test(TestCase::should_succeed(
        "line_comment_at_end",
        "print 1; // trailing",
    ));

    suite
}

fn create_malformed_expressions_tests() -> TestSuite {
    let mut suite = TestSuite::new("Malformed Expressions");

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren",
        "print (1 + 2;",
        "Expect ')' after expression.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "missing_right_operand",
        "print 1 +;",
        "Expect expression.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "literal_assignment_target",
        "1 = 2;",
        "Invalid assignment target.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "binary_assignment_target",
        "a + b = c;",
        "Invalid assignment target.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "ternary_missing_colon",
        "true ? 1;",
        "Expect ':'",
    ));
    suite.add_test(TestCase::should_succeed(
        "ternary_arms_assign",
        "var x; var y; true ? x = 1 : y = 2;",
    ));
    suite.add_test(TestCase::should_succeed(
        "nested_ternary_arms_assign",
        "var x; var y; true ? false ? x = 1 : y = 2 : x = 3;",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "property_without_name",
        "obj.;",
        "Expect property name after '.'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "bare_super",
        "super;",
        "Expect '.' after 'super'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "two_values_one_statement",
        "print 1 2;",
        "Expect ';' after value.",
    ));

    suite
}

fn create_statement_tests() -> TestSuite {
    let mut suite = TestSuite::new("Statements");

    suite.add_test(TestCase::should_fail_with_message(
        "var_without_name",
        "var = 3;",
        "Expect variable name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "var_without_semicolon",
        "var x = 1",
        "Expect ';' after variable declaration.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "print_without_semicolon",
        "print 1",
        "Expect ';' after value.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_block",
        "{ print 1;",
        "Expect '}' after block.",
    ));
    suite.add_test(TestCase::should_succeed("echo_inside_block", "{ 1 + 2 }"));
    suite.add_test(TestCase::should_succeed(
        "echo_followed_by_statement",
        "1 + 2 print 3;",
    ));
    suite.add_test(TestCase::should_fail(
        "several_errors_in_one_pass",
        "var = 1;\nprint ;\nvar ok = 2;",
    ));

    suite
}

fn create_control_flow_tests() -> TestSuite {
    let mut suite = TestSuite::new("Control Flow");

    suite.add_test(TestCase::should_fail_with_message(
        "if_without_paren",
        "if x) print 1;",
        "Expect '(' after 'if'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "while_unclosed_condition",
        "while (true print 1;",
        "Expect ')' after condition.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "for_missing_semicolon",
        "for (var i = 0; i < 3 i = i + 1) print i;",
        "Expect ';' after loop condition.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "break_outside_loop",
        "break;",
        "Can't use 'break' outside of a loop.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "continue_outside_loop",
        "if (true) continue;",
        "Can't use 'continue' outside of a loop.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "break_without_semicolon",
        "while (true) { break }",
        "Expect ';' after 'break'.",
    ));
    suite.add_test(TestCase::should_succeed("empty_for_clauses", "for (;;) { break; }"));
    suite.add_test(TestCase::should_succeed(
        "break_inside_function_inside_loop",
        "while (true) { fun f() { break; } }",
    ));

    suite
}

fn create_function_tests() -> TestSuite {
    let mut suite = TestSuite::new("Functions");

    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_parameter_list",
        "fun f(a, b { }",
        "Expect ')' after parameters.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "literal_parameter",
        "fun f(1) {}",
        "Expect parameter name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unclosed_argument_list",
        "f(1, 2;",
        "Expect ')' after arguments.",
    ));

    let args = vec!["0"; 256].join(", ");
    suite.add_test(TestCase::should_fail_with_message(
        "too_many_arguments",
        &format!("f({});", args),
        "Can't have more than 255 arguments.",
    ));
    let params: Vec<String> = (0..256).map(|i| format!("p{}", i)).collect();
    suite.add_test(TestCase::should_fail_with_message(
        "too_many_parameters",
        &format!("fun f({}) {{}}", params.join(", ")),
        "Can't have more than 255 parameters.",
    ));

    suite.add_test(TestCase::should_succeed(
        "lambda_expression_statement",
        "fun (a) { return a; }",
    ));
    suite.add_test(TestCase::should_succeed(
        "lambda_in_initializer",
        "var twice = fun (x) { return x * 2; };",
    ));
    suite.add_test(TestCase::should_succeed(
        "lambda_as_argument",
        "fun apply(f, x) { return f(x); } print apply(fun (n) { return n + 1; }, 1);",
    ));

    suite
}

fn create_class_tests() -> TestSuite {
    let mut suite = TestSuite::new("Classes");

    suite.add_test(TestCase::should_fail_with_message(
        "class_without_name",
        "class { }",
        "Expect class name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "superclass_without_name",
        "class A < { }",
        "Expect superclass name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "self_inheritance",
        "class A < A {}",
        "A class can't inherit from itself.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "getter_without_return",
        "class Circle { area { print 1; } }",
        "A getter must have a return statement.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "static_named_init",
        "class A { class init() {} }",
        "A static method can't be named 'init'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "getter_named_init",
        "class A { init { return 1; } }",
        "A getter can't be named 'init'.",
    ));
    suite.add_test(TestCase::should_succeed(
        "all_member_kinds",
        "class Shape { init(r) { this.r = r; } area { return this.r * this.r; } class unit() { return Shape(1); } describe() { return \"shape\"; } }",
    ));
    suite.add_test(TestCase::should_succeed(
        "subclass_with_super",
        "class A { f() { return 1; } } class B < A { f() { return super.f() + 1; } }",
    ));

    suite
}

fn create_resolution_tests() -> TestSuite {
    let mut suite = TestSuite::new("Resolution");

    suite.add_test(TestCase::should_fail_with_message(
        "this_outside_class",
        "print this;",
        "Can't use 'this' outside of a class.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "this_in_static_method",
        "class A { class make() { return this; } }",
        "Can't use 'this' in a static method.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "super_without_superclass",
        "class A { f() { return super.f(); } }",
        "Can't use 'super' in a class with no superclass.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "super_outside_class",
        "fun f() { return super.g(); }",
        "Can't use 'super' outside of a class.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "top_level_return",
        "return 1;",
        "Can't return from top-level code.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "value_returned_from_initializer",
        "class A { init() { return 1; } }",
        "Can't return a value from an initializer.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "duplicate_local",
        "{ var a = 1; var a = 2; }",
        "Already a variable with this name in this scope.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "super_in_lambda_in_static_method",
        "class A { f() { return 1; } } class B < A { class s() { var g = fun () { return super.f(); }; return g(); } }",
        "Can't use 'super' in a static method.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "this_in_function_in_static_method",
        "class A { class s() { fun g() { return this; } return g(); } }",
        "Can't use 'this' in a static method.",
    ));
    suite.add_test(TestCase::should_succeed(
        "duplicate_global",
        "var a = 1; var a = 2;",
    ));
    suite.add_test(TestCase::should_succeed(
        "bare_return_from_initializer",
        "class A { init() { return; } }",
    ));
    suite.add_test(TestCase::should_succeed(
        "shadowing_initializer_reads_outer",
        "var a = 1; { var a = a + 1; print a; }",
    ));

    suite
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_front_end_tests() {
    let suites = vec![
        create_lexical_tests(),
        create_malformed_expressions_tests(),
        create_statement_tests(),
        create_control_flow_tests(),
        create_function_tests(),
        create_class_tests(),
        create_resolution_tests(),
    ];

    let mut failures = Vec::new();
    for suite in suites {
        let results = suite.run();
        if !results.is_all_passed() {
            failures.push(results.suite_name);
        }
    }

    assert!(failures.is_empty(), "failing suites: {:?}", failures);
}
