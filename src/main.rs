fn main() -> std::process::ExitCode {
    screenshot_tweets_lib::run()
}
