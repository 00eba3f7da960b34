mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::RunProgress;
pub use styling::{bright_yellow, cyan, dim, magenta_bold};
pub use summary::{print_metric_names, print_summary, render_json};

/// Prints the maintlens banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("📐 maintlens"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Repository ingestion and maintainability metrics")
    );
}
