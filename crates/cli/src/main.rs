fn main() {
    if let Err(e) = fataar_cli::run() {
        eprintln!("{}", fataar_cli::describe_error(e.as_ref()));
        std::process::exit(1);
    }
}
