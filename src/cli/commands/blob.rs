use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("blob-endpoint")
                .long("blob-endpoint")
                .help("Base URL of the blob store used to mirror the credential store")
                .env("KEYRELAY_BLOB_ENDPOINT")
                .required(true),
        )
        .arg(
            Arg::new("blob-remote-name")
                .long("blob-remote-name")
                .help("Object name of the store snapshot in the blob store")
                .default_value("keyrelay.db")
                .env("KEYRELAY_BLOB_REMOTE_NAME"),
        )
        .arg(
            Arg::new("blob-token")
                .long("blob-token")
                .help("Bearer token for the blob store")
                .env("KEYRELAY_BLOB_TOKEN"),
        )
}
