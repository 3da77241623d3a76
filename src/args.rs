use clap::Parser;

/// This is a batch program for the survey vetting protocol: it replays votes and
/// value submissions on locale data and reports what each of them did.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file describing the batch: users, existing data, rules and submissions.
    /// For more information about the file format, read the manual of the survey_vetting crate.
    #[clap(short, long, value_parser)]
    pub config: String,
    /// (file path) A reference file containing the summary of the batch in JSON format. If provided, stvet will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the batch will be written to the given
    /// location. Setting this option overrides the path that may be specified in the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the submissions are read from this file instead of the
    /// submission sources of the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (json or xlsx) The type of the input. By default, guessed from the file extension.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default: first worksheet) When using an Excel file, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (json or html, default json) The format of the output.
    #[clap(short, long, value_parser)]
    pub format: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
