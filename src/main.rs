use lxs::cli::{self, EntryPoint};

fn main() {
    cli::main_with(EntryPoint::all());
}
