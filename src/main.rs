fn main() {
    if let Err(err) = restdemo::app::run() {
        eprintln!("restdemo startup failed: {err}");
        std::process::exit(1);
    }
}
