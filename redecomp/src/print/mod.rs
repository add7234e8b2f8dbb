mod options;
mod precedence;
mod printer;

pub use options::PrintOptions;
pub use printer::{format_expr, print_function};
