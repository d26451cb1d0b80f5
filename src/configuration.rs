use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::authorization::local_hostname;

const UNSET_ID: i64 = -999;
const INSTALL_DIR_KEY: &str = "installDir";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.\-]+)\}").expect("placeholder pattern is valid"));

/// Problems with caller-supplied configuration, reported as `InfoError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no executable is set")]
    MissingExecutable,
    #[error("no working directory is set")]
    MissingWorkingDirectory,
}

/// An input file: the symbolic name used in `${name}` placeholders and the
/// path it is staged from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub name: String,
    pub path: String,
}

impl InputFile {
    /// File name the input has once staged into a working directory.
    pub fn staged_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.path)
    }
}

/// Everything needed to run one job.
#[derive(Debug, Clone)]
pub struct CommandConfiguration {
    id: i64,
    executable: Option<String>,
    interpreter: Option<String>,
    arguments: Vec<String>,
    input_files: Vec<InputFile>,
    append_input: bool,
    working_directory: Option<PathBuf>,
    remote_working_directory: Option<String>,
    install_directory: Option<String>,
    std_out_file: Option<String>,
    std_err_file: Option<String>,
    num_procs: u32,
    os: String,
}

impl Default for CommandConfiguration {
    fn default() -> Self {
        CommandConfiguration {
            id: UNSET_ID,
            executable: None,
            interpreter: None,
            arguments: Vec::new(),
            input_files: Vec::new(),
            append_input: true,
            working_directory: None,
            remote_working_directory: None,
            install_directory: None,
            std_out_file: None,
            std_err_file: None,
            num_procs: 1,
            os: std::env::consts::OS.to_string(),
        }
    }
}

impl CommandConfiguration {
    pub fn new() -> CommandConfiguration {
        Self::default()
    }

    pub fn set_id(&mut self, id: i64) -> &mut Self {
        self.id = id;
        self
    }

    pub fn set_executable(&mut self, executable: impl Into<String>) -> &mut Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn set_interpreter(&mut self, interpreter: impl Into<String>) -> &mut Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn add_argument(&mut self, argument: impl Into<String>) -> &mut Self {
        self.arguments.push(argument.into());
        self
    }

    /// Adds an input file, replacing any earlier one with the same name.
    pub fn add_input_file(&mut self, name: impl Into<String>, path: impl Into<String>) -> &mut Self {
        let input = InputFile {
            name: name.into(),
            path: path.into(),
        };
        match self.input_files.iter_mut().find(|existing| existing.name == input.name) {
            Some(existing) => *existing = input,
            None => self.input_files.push(input),
        }
        self
    }

    /// When on, staged input names are appended to the invocation; when off,
    /// `${name}` placeholders in it are substituted instead.
    pub fn set_append_input(&mut self, append: bool) -> &mut Self {
        self.append_input = append;
        self
    }

    pub fn set_working_directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.working_directory = Some(directory.into());
        self
    }

    /// Setting this makes the command remote.
    pub fn set_remote_working_directory(&mut self, directory: impl Into<String>) -> &mut Self {
        self.remote_working_directory = Some(directory.into());
        self
    }

    pub fn set_install_directory(&mut self, directory: impl Into<String>) -> &mut Self {
        self.install_directory = Some(directory.into());
        self
    }

    pub fn set_std_out_file(&mut self, file_name: impl Into<String>) -> &mut Self {
        self.std_out_file = Some(file_name.into());
        self
    }

    pub fn set_std_err_file(&mut self, file_name: impl Into<String>) -> &mut Self {
        self.std_err_file = Some(file_name.into());
        self
    }

    pub fn set_num_procs(&mut self, num_procs: u32) -> &mut Self {
        self.num_procs = num_procs.max(1);
        self
    }

    pub fn set_os(&mut self, os: impl Into<String>) -> &mut Self {
        self.os = os.into();
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn executable(&self) -> Option<&str> {
        self.executable.as_deref()
    }

    pub fn interpreter(&self) -> Option<&str> {
        self.interpreter.as_deref()
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn input_files(&self) -> &[InputFile] {
        &self.input_files
    }

    pub fn is_append_input(&self) -> bool {
        self.append_input
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn remote_working_directory(&self) -> Option<&str> {
        self.remote_working_directory.as_deref()
    }

    pub fn install_directory(&self) -> Option<&str> {
        self.install_directory.as_deref()
    }

    pub fn std_out_file(&self) -> Option<&str> {
        self.std_out_file.as_deref()
    }

    pub fn std_err_file(&self) -> Option<&str> {
        self.std_err_file.as_deref()
    }

    pub fn num_procs(&self) -> u32 {
        self.num_procs
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn is_remote(&self) -> bool {
        self.remote_working_directory.is_some()
    }

    pub fn is_windows(&self) -> bool {
        self.os.to_ascii_lowercase().starts_with("win")
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.executable.as_deref().map_or(true, |executable| executable.trim().is_empty()) {
            return Err(ConfigurationError::MissingExecutable);
        }
        if self.working_directory.is_none() {
            return Err(ConfigurationError::MissingWorkingDirectory);
        }
        Ok(())
    }

    /// The full command line: interpreter, executable, arguments and inputs,
    /// with placeholders expanded and an `mpirun` prefix for multi-process runs.
    pub fn executable_invocation(&self) -> Option<String> {
        let executable = self.executable.as_deref()?;

        let mut invocation = String::new();
        if let Some(interpreter) = &self.interpreter {
            invocation.push_str(interpreter);
            invocation.push(' ');
        }
        invocation.push_str(executable);
        for argument in &self.arguments {
            invocation.push(' ');
            invocation.push_str(argument);
        }
        if self.append_input {
            for input in &self.input_files {
                invocation.push(' ');
                invocation.push_str(input.staged_name());
            }
        }

        let install_directory = self.install_directory_with_separator();
        let invocation = PLACEHOLDER.replace_all(&invocation, |captures: &Captures| {
            let key = &captures[1];
            if key == INSTALL_DIR_KEY {
                if let Some(directory) = &install_directory {
                    return directory.clone();
                }
            } else if !self.append_input {
                if let Some(input) = self.input_files.iter().find(|input| input.name == key) {
                    return input.staged_name().to_string();
                }
            }
            captures[0].to_string()
        });

        let invocation = if self.num_procs > 1 {
            format!("mpirun -np {} {}", self.num_procs, invocation)
        } else {
            invocation.into_owned()
        };
        Some(invocation.trim().to_string())
    }

    /// The invocation split on `;` into stages that run one after another.
    pub fn stages(&self) -> Vec<String> {
        self.executable_invocation()
            .map(|invocation| {
                invocation
                    .split(';')
                    .map(str::trim)
                    .filter(|stage| !stage.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Header written at the top of an output capture file.
    pub fn output_header(&self, log_name: &str, target_host: &str) -> String {
        let launch_date = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let input_names: Vec<&str> = self.input_files.iter().map(InputFile::staged_name).collect();

        let mut header = String::new();
        header.push_str(&format!("# Logfile type : {log_name}\n"));
        header.push_str(&format!("# Job launch date: {launch_date}\n"));
        header.push_str(&format!("# Launch host: {}\n", local_hostname()));
        header.push_str(&format!("# Target host: {target_host}\n"));
        header.push_str(&format!(
            "# Command Executed: {}\n",
            self.executable_invocation().unwrap_or_default()
        ));
        header.push_str(&format!("# Input files: {}\n", input_names.join(" ")));
        header.push_str(&format!(
            "# Install directory: {}\n",
            self.install_directory.as_deref().unwrap_or_default()
        ));
        header
    }

    fn install_directory_with_separator(&self) -> Option<String> {
        let directory = self.install_directory.as_deref()?;
        let separator = if directory.contains(":\\") { '\\' } else { '/' };
        if directory.ends_with(separator) {
            Some(directory.to_string())
        } else {
            Some(format!("{directory}{separator}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandConfiguration, ConfigurationError};

    #[test]
    fn defaults() {
        let config = CommandConfiguration::new();
        assert_eq!(config.id(), -999);
        assert!(config.is_append_input());
        assert_eq!(config.num_procs(), 1);
        assert!(!config.is_remote());
        assert_eq!(config.validate(), Err(ConfigurationError::MissingExecutable));
    }

    #[test]
    fn working_directory_is_required() {
        let mut config = CommandConfiguration::new();
        config.set_executable("./run.sh");
        assert_eq!(config.validate(), Err(ConfigurationError::MissingWorkingDirectory));
        config.set_working_directory("/tmp");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn appends_inputs_after_arguments() {
        let mut config = CommandConfiguration::new();
        config
            .set_interpreter("python3")
            .set_executable("solve.py")
            .add_argument("-v")
            .add_input_file("mesh", "data/mesh.txt")
            .add_input_file("params", "/abs/params.ini");
        assert_eq!(
            config.executable_invocation().as_deref(),
            Some("python3 solve.py -v mesh.txt params.ini")
        );
    }

    #[test]
    fn substitutes_placeholders_when_not_appending() {
        let mut config = CommandConfiguration::new();
        config
            .set_executable("${installDir}solver --in ${mesh} --other ${unknown}")
            .set_install_directory("/opt/solver")
            .add_input_file("mesh", "inputs/mesh.txt")
            .set_append_input(false);
        assert_eq!(
            config.executable_invocation().as_deref(),
            Some("/opt/solver/solver --in mesh.txt --other ${unknown}")
        );
    }

    #[test]
    fn duplicate_input_names_replace() {
        let mut config = CommandConfiguration::new();
        config.add_input_file("a", "one.txt").add_input_file("a", "two.txt");
        assert_eq!(config.input_files().len(), 1);
        assert_eq!(config.input_files()[0].path, "two.txt");
    }

    #[test]
    fn multiple_procs_use_mpirun() {
        let mut config = CommandConfiguration::new();
        config.set_executable("./a.out").set_num_procs(4);
        assert_eq!(config.executable_invocation().as_deref(), Some("mpirun -np 4 ./a.out"));
    }

    #[test]
    fn splits_into_stages() {
        let mut config = CommandConfiguration::new();
        config.set_executable("make; ./build/app ;");
        assert_eq!(config.stages(), vec!["make".to_string(), "./build/app".to_string()]);
    }

    #[test]
    fn header_lists_inputs_and_command() {
        let mut config = CommandConfiguration::new();
        config.set_executable("./run.sh").add_input_file("in", "input.txt");
        let header = config.output_header("standard output", "cluster");
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "# Logfile type : standard output");
        assert!(lines[1].starts_with("# Job launch date: "));
        assert_eq!(lines[1].len(), "# Job launch date: ".len() + 15);
        assert_eq!(lines[3], "# Target host: cluster");
        assert_eq!(lines[4], "# Command Executed: ./run.sh input.txt");
        assert_eq!(lines[5], "# Input files: input.txt");
    }
}
