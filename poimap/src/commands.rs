use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("poimap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("poimap")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            session_args(geocoder_args(source_args(
                command!("load")
                    .about(
                        "Load records, geocode rows without coordinates and print the \
                    resulting legend and markers.",
                    ),
            )))
            .arg(
                arg!(--"tag" <TAG>)
                    .required(false)
                    .help("Show only markers carrying this tag (case-insensitive)")
                    .conflicts_with_all(["tags", "search"]),
            )
            .arg(
                arg!(--"tags" <TAGS>)
                    .required(false)
                    .help("Comma-separated tags; combined according to --tag-match")
                    .conflicts_with_all(["tag", "search"]),
            )
            .arg(
                arg!(-s --"search" <QUERY>)
                    .required(false)
                    .help("Show only markers whose name or tags contain QUERY")
                    .conflicts_with_all(["tag", "tags"]),
            )
            .arg(
                arg!(-o --"output" <PATH>)
                    .required(false)
                    .help("Save report to file (default: display to screen)")
                    .value_parser(clap::value_parser!(std::path::PathBuf)),
            )
            .arg(
                arg!(-f --"format" <FORMAT>)
                    .required(false)
                    .help("Report format: text, json, html")
                    .value_parser(["text", "json", "html"])
                    .default_value("text"),
            ),
        )
        .subcommand(
            geocoder_args(
                command!("locate")
                    .about("Resolve a free-text address to coordinates")
                    .arg(arg!(<ADDRESS>).required(true).help("The address to look up")),
            ),
        )
        .subcommand(session_args(geocoder_args(source_args(
            command!("ui").about("Load records and explore the legend interactively"),
        ))))
}

fn source_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-b --"table-base" <BASE_ID>)
            .required(false)
            .help("Base id of the table API")
            .requires("table")
            .conflicts_with("csv"),
    )
    .arg(
        arg!(-t --"table" <TABLE>)
            .required(false)
            .help("Table name or id")
            .requires("table-base"),
    )
    .arg(
        arg!(--"view" <VIEW>)
            .required(false)
            .help("Named view; rows are returned in the view's order")
            .requires("table"),
    )
    .arg(
        arg!(--"table-token" <TOKEN>)
            .required(false)
            .help("Table API token (default: $POIMAP_TABLE_TOKEN)"),
    )
    .arg(
        arg!(--"api-base" <URL>)
            .required(false)
            .help("Root of the table API")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(--"page-size" <NUM>)
            .required(false)
            .help("Rows per table page (the API caps this at 100)")
            .value_parser(clap::value_parser!(u32).range(1..=100))
            .requires("table"),
    )
    .arg(
        arg!(-c --"csv" <SOURCE>)
            .required(false)
            .help("CSV export to read instead of a table: an http(s) URL or a local path")
            .conflicts_with("table-base"),
    )
    .group(
        clap::ArgGroup::new("source")
            .args(["table-base", "csv"])
            .required(true),
    )
    .arg(
        arg!(--"org-field" <COLUMN>)
            .required(false)
            .help("Column holding the organization name")
            .default_value("Org Name"),
    )
    .arg(
        arg!(--"address-field" <COLUMN>)
            .required(false)
            .help("Column holding the street address")
            .default_value("Address"),
    )
    .arg(
        arg!(--"tags-field" <COLUMN>)
            .required(false)
            .help("Column holding the tags")
            .default_value("Tags"),
    )
    .arg(
        arg!(--"latitude-field" <COLUMN>)
            .required(false)
            .help("Column holding the latitude (also used for write-back)")
            .default_value("Latitude"),
    )
    .arg(
        arg!(--"longitude-field" <COLUMN>)
            .required(false)
            .help("Column holding the longitude (also used for write-back)")
            .default_value("Longitude"),
    )
}

fn geocoder_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(--"geocoder-token" <TOKEN>)
            .required(false)
            .help("Geocoding access token (default: $POIMAP_GEOCODER_TOKEN)"),
    )
    .arg(
        arg!(--"geocoder-endpoint" <URL>)
            .required(false)
            .help("Forward geocoding endpoint")
            .value_parser(clap::value_parser!(Url)),
    )
    .arg(
        arg!(--"country" <CODE>)
            .required(false)
            .help("Restrict geocoding results to a country code"),
    )
    .arg(
        arg!(--"proximity" <LNG_LAT>)
            .required(false)
            .help("Bias geocoding results towards 'longitude,latitude'"),
    )
    .arg(
        arg!(--"limit" <NUM>)
            .required(false)
            .help("Maximum number of geocoding candidates to request")
            .value_parser(clap::value_parser!(u8).range(1..=10)),
    )
}

fn session_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-g --"group-by" <MODE>)
            .required(false)
            .help("Legend grouping: tag or organization")
            .value_parser(["tag", "organization", "org"])
            .default_value("tag"),
    )
    .arg(
        arg!(--"tag-match" <POLICY>)
            .required(false)
            .help("How several checked tags combine: all or any")
            .value_parser(["all", "any"])
            .default_value("all"),
    )
    .arg(
        arg!(-j --"concurrency" <NUM>)
            .required(false)
            .help("Geocode up to NUM rows at once (1 = strictly sequential)")
            .value_parser(clap::value_parser!(usize))
            .default_value("1"),
    )
    .arg(
        arg!(--"write-back")
            .required(false)
            .help("Store geocoded coordinates back into the table")
            .action(clap::ArgAction::SetTrue)
            .requires("table-base"),
    )
    .arg(
        arg!(--"cache")
            .required(false)
            .help("Geocode identical addresses only once per load")
            .action(clap::ArgAction::SetTrue),
    )
}
