//! Arithmetic tools: add, subtract, multiply, divide.
//!
//! Each takes two numbers `a` and `b`. Whole results print without a
//! trailing `.0` so the model reads `4`, not `4.0`.

use tether_core::Result;
use tether_core::tool::Tool;
use tether_core::tool_args;

tool_args! {
    #[derive(Debug)]
    pub struct BinaryArgs {
        pub a: f64 => "The first number",
        pub b: f64 => "The second number",
    }
}

/// Format nicely: remove trailing .0 for integers.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn binary(name: &str, description: &str, op: fn(f64, f64) -> f64) -> Result<Tool> {
    Tool::new(name, description, move |args: BinaryArgs| -> std::result::Result<String, String> {
        Ok(format_number(op(args.a, args.b)))
    })
}

pub fn add() -> Result<Tool> {
    binary("add", "Add two numbers and return the sum.", |a, b| a + b)
}

pub fn subtract() -> Result<Tool> {
    binary("subtract", "Subtract b from a and return the difference.", |a, b| a - b)
}

pub fn multiply() -> Result<Tool> {
    binary("multiply", "Multiply two numbers and return the product.", |a, b| a * b)
}

pub fn divide() -> Result<Tool> {
    Tool::new(
        "divide",
        "Divide a by b and return the quotient.",
        |args: BinaryArgs| -> std::result::Result<String, String> {
            if args.b == 0.0 {
                return Err("division by zero".into());
            }
            Ok(format_number(args.a / args.b))
        },
    )
}
