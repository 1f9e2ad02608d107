use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "testgate",
    version,
    about = "Audit gate for multi-module builds",
    long_about = "testgate runs a fixed catalog of audits over a module's tool reports and \
                  source tree, writes one JSON verdict, and exits non-zero when any audit fails."
)]
pub struct Cli {
    /// Module directory to audit
    pub module_dir: PathBuf,

    /// Module identifier used in the report (defaults to ":<dir name>")
    #[arg(long)]
    pub module: Option<String>,

    /// Config file (discovered by walking up from the module dir when omitted)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Report output path (overrides the configured location)
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// File with captured compiler stderr to feed the compilation audit
    #[arg(long, value_name = "FILE")]
    pub compiler_log: Option<PathBuf>,

    /// Disable the report upload regardless of configuration
    #[arg(long)]
    pub no_upload: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Module identifier: explicit flag or ":<dir name>".
    pub fn module_name(&self) -> String {
        if let Some(name) = &self.module {
            return name.clone();
        }
        let dir = self
            .module_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        format!(":{}", dir)
    }
}
