fn main() {
    std::process::exit(mayhem::app::startup::startup());
}
