mod blob;
mod forum;
mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("keyrelay")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("KEYRELAY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("db")
                .short('d')
                .long("db")
                .help("Path to the local credential store file")
                .default_value("instance/keyrelay.db")
                .env("KEYRELAY_DB"),
        )
        .arg(
            Arg::new("ip-header")
                .long("ip-header")
                .help("Header carrying the client IP when running behind a proxy")
                .default_value("X-Forwarded-For")
                .env("KEYRELAY_IP_HEADER"),
        );

    let command = blob::with_args(command);
    let command = forum::with_args(command);
    logging::with_args(command)
}
