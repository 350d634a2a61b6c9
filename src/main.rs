fn main() -> std::process::ExitCode {
    vitalwatch_lib::run()
}
