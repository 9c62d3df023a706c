fn main() {
    if let Err(e) = virapipe::run() {
        eprintln!("Error: {e:?}");
        std::process::exit(1);
    }
}
