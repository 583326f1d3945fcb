use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("forum-url")
                .long("forum-url")
                .help("Base URL of the Discourse forum used for private-message delivery")
                .env("KEYRELAY_FORUM_URL")
                .required(true),
        )
        .arg(
            Arg::new("forum-session-cookie")
                .long("forum-session-cookie")
                .help("Value of the bot account `_forum_session` cookie")
                .env("KEYRELAY_FORUM_SESSION"),
        )
        .arg(
            Arg::new("forum-user-cookie")
                .long("forum-user-cookie")
                .help("Value of the bot account `_t` cookie")
                .env("KEYRELAY_FORUM_TOKEN"),
        )
        .arg(
            Arg::new("bot-email")
                .long("bot-email")
                .help("Contact address sent as the User-Agent on forum requests")
                .env("KEYRELAY_BOT_EMAIL"),
        )
}
