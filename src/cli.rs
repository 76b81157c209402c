use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::preference::STORAGE_KEY;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Saved HTML page to run the dark mode script on.
    #[arg(long, required_unless_present = "url", conflicts_with = "url")]
    pub input: Option<PathBuf>,

    /// Fetch the page from this URL instead of reading `--input`.
    #[arg(long)]
    pub url: Option<Url>,

    /// Where to write the resulting page. Printed to stdout when omitted.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// JSON file holding the persisted preference.
    #[arg(long, default_value = "jenkins-dark.json")]
    pub state: PathBuf,

    /// Behave as if the extension storage API were missing: the page defaults
    /// to dark and toggles are not persisted.
    #[arg(long)]
    pub no_storage: bool,

    /// Key the preference is stored under.
    #[arg(long, default_value = STORAGE_KEY)]
    pub storage_key: String,

    /// Number of toggle clicks to replay after the page is initialized.
    #[arg(long, default_value_t = 0)]
    pub toggle: u32,

    /// HTML fragment files appended to `<body>` after initialization, one
    /// insertion per file, in order.
    #[arg(long)]
    pub inject: Vec<PathBuf>,

    /// Images and graphics smaller than this (either axis) are treated as icons.
    #[arg(long, default_value_t = 16.0)]
    pub min_icon_size: f64,

    /// Write a JSON summary of the run to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// HTTP User-Agent used with `--url`.
    #[arg(long, default_value = "jenkins-dark/0.1")]
    pub user_agent: String,
}
