// Output formatting helpers for CLI commands

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a dim success message
pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

/// Print a dim failure message
pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

/// Short tag identifying a job in interleaved output
pub fn job_tag(job_index: usize) -> String {
    format!("[job {:>2}]", job_index + 1)
}

/// Print a job header
pub fn job_header(job_index: usize, name: &str, total_steps: usize) {
    eprintln!(
        "\x1b[1;34m{}\x1b[0m {} ({} steps)",
        job_tag(job_index),
        name,
        total_steps
    );
}

/// Print step output (indented)
pub fn step_output(job_index: usize, line: &str) {
    println!("{}     | {}", job_tag(job_index), line);
}

/// Print step output (indented) on stderr
pub fn step_log(job_index: usize, line: &str) {
    eprintln!("{}     | {}", job_tag(job_index), line);
}

/// Print step error output (indented, red)
pub fn step_error(job_index: usize, line: &str) {
    eprintln!("\x1b[31m{}     | {}\x1b[0m", job_tag(job_index), line);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}
