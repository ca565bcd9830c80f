use clap::CommandFactory;
use clap_complete::Shell;

use super::CliArgs;

#[derive(clap::Args, Debug)]
pub struct GenerateCompletions {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    shell: Shell,
}

impl GenerateCompletions {
    pub fn print(&self) {
        let mut cmd = CliArgs::command();
        clap_complete::generate(self.shell, &mut cmd, "kargo-render", &mut std::io::stdout());
    }
}
