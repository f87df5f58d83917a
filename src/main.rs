//! devflow CLI binary
//!
//! Minimal entrypoint: all logic lives in the library, main.rs only maps
//! the returned exit code to the process exit.

fn main() {
    // cli::run() handles ALL output including errors.
    if let Err(code) = devflow::cli::run() {
        std::process::exit(code.as_i32());
    }
}
