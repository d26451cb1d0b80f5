use std::borrow::Cow;

use shell_escape::unix::escape;

use crate::executor::ProcessConfiguration;

pub trait DeriveExt {
    /// Renders the configuration as a single POSIX shell line for a remote exec request.
    fn derive_shell_command(&self) -> String;
}

impl DeriveExt for ProcessConfiguration {
    fn derive_shell_command(&self) -> String {
        // example of desugared command:
        // (cd working_dir && exec actual_command arg1 arg2 ...)

        let mut sections: Vec<String> = Vec::new();

        // 1. working dir
        if let Some(working_dir) = &self.working_dir {
            sections.push(format!("cd {}", quote(working_dir)));
        }
        // 2.1. run the command with exec, thus giving it the shell's PID
        let mut exec_section = String::from("exec ");
        exec_section.push_str(&self.program);
        // 2.2. append shell-escaped args to the command
        for arg in &self.args {
            exec_section.push(' ');
            exec_section.push_str(&quote(arg));
        }
        sections.push(exec_section);

        // join sections with && and wrap them in a subshell
        let mut output = String::from('(');
        output.push_str(sections.join(" && ").as_str());
        output.push(')');

        output
    }
}

pub(crate) fn quote(value: &str) -> String {
    escape(Cow::Borrowed(value)).into_owned()
}
