//! Runs the Romeo & Juliet quick start dataset only.

use lxs::cli::{self, EntryPoint};

fn main() {
    cli::main_with(EntryPoint::single("romeo_quickstart"));
}
