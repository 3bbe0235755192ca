use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Only run tests whose markers match the expression (e.g. 'slow and not db')
    #[arg(short = 'm', long = "markexpr")]
    pub markexpr: Option<String>,

    /// Directory node ids are relative to (default: closest trellis.toml)
    #[arg(long)]
    pub rootdir: Option<PathBuf>,

    /// Fail on markers not registered in the configuration
    #[arg(long)]
    pub strict_markers: bool,

    /// Files, directories or node ids to collect
    pub files: Vec<String>,
}
