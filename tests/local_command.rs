use std::{
    io,
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use jobwire::{CommandConfiguration, CommandFactory, CommandKind, CommandStatus, UpdateHandler};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct RecordingUpdates {
    messages: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl UpdateHandler for RecordingUpdates {
    async fn post_update(&self, message: &str) -> io::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct FailingUpdates;

#[async_trait]
impl UpdateHandler for FailingUpdates {
    async fn post_update(&self, _message: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "endpoint down"))
    }
}

fn configuration(working_directory: &Path, executable: &str) -> CommandConfiguration {
    let mut configuration = CommandConfiguration::new();
    configuration
        .set_id(7)
        .set_executable(executable)
        .set_working_directory(working_directory);
    configuration
}

async fn run(configuration: CommandConfiguration) -> jobwire::Command {
    let mut command = CommandFactory::default()
        .get_command(configuration, None)
        .await
        .expect("Could not build local command");
    command.execute().await;
    command
}

#[tokio::test]
async fn successful_command_captures_output() {
    let dir = TempDir::new().unwrap();
    let mut config = configuration(dir.path(), "echo");
    config.add_argument("hello").set_std_out_file("out.log");

    let command = run(config).await;
    assert_eq!(command.kind(), CommandKind::Local);
    assert_eq!(command.status(), CommandStatus::Success);
    assert_eq!(command.std_output(), "hello\n");

    let log = tokio::fs::read_to_string(dir.path().join("out.log")).await.unwrap();
    assert!(log.starts_with("# Logfile type : standard output\n"));
    assert!(log.contains("# Command Executed: echo hello\n"));
    assert!(log.ends_with("hello\n"));
}

#[tokio::test]
async fn missing_executable_is_info_error() {
    let dir = TempDir::new().unwrap();
    let mut config = CommandConfiguration::new();
    config.set_working_directory(dir.path());

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::InfoError);
}

#[tokio::test]
async fn unset_working_directory_is_info_error() {
    let mut config = CommandConfiguration::new();
    config.set_executable("true");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::InfoError);
}

#[tokio::test]
async fn nonexistent_working_directory_fails() {
    let dir = TempDir::new().unwrap();
    let config = configuration(&dir.path().join("missing"), "true");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Failed);
}

#[tokio::test]
async fn non_zero_exit_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = configuration(dir.path(), "exit 3");
    config.set_std_err_file("err.log");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Failed);
    assert!(dir.path().join("err.log").exists());
}

#[tokio::test]
async fn inputs_are_staged_and_appended() {
    let inputs = TempDir::new().unwrap();
    let source = inputs.path().join("mesh.dat");
    tokio::fs::write(&source, "nodes 12\n").await.unwrap();

    let dir = TempDir::new().unwrap();
    let mut config = configuration(dir.path(), "cat");
    config.add_input_file("mesh", source.to_str().unwrap());

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Success);
    assert_eq!(command.std_output(), "nodes 12\n");
    assert!(dir.path().join("mesh.dat").exists());
    assert!(source.exists());
}

#[tokio::test]
async fn substituted_inputs_are_not_appended() {
    let dir = TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("input.txt"), "payload").await.unwrap();

    let mut config = configuration(dir.path(), "cat ${input} ${input}");
    config.add_input_file("input", "input.txt").set_append_input(false);

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Success);
    assert_eq!(command.std_output(), "payloadpayload");
}

#[tokio::test]
async fn missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let mut config = configuration(dir.path(), "true");
    config.add_input_file("mesh", "/nonexistent/mesh.dat");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Failed);
}

#[tokio::test]
async fn stages_stop_at_first_failure() {
    let dir = TempDir::new().unwrap();
    let config = configuration(dir.path(), "echo one; false; echo three");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Failed);
    assert_eq!(command.std_output(), "one\n");
}

#[tokio::test]
async fn stages_run_in_working_directory() {
    let dir = TempDir::new().unwrap();
    let config = configuration(dir.path(), "touch marker; ls");

    let command = run(config).await;
    assert_eq!(command.status(), CommandStatus::Success);
    assert!(command.std_output().contains("marker"));
}

#[tokio::test]
async fn update_handler_receives_terminal_status() {
    let dir = TempDir::new().unwrap();
    let updates = RecordingUpdates::default();

    let mut command = CommandFactory::default()
        .get_command(configuration(dir.path(), "false"), None)
        .await
        .unwrap();
    command.set_update_handler(Box::new(updates.clone()));
    assert_eq!(command.execute().await, CommandStatus::Failed);

    let messages = updates.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Job number 7 on "));
    assert!(messages[0].ends_with("finished with status Failed"));
}

#[tokio::test]
async fn failed_update_keeps_status() {
    let dir = TempDir::new().unwrap();
    let mut command = CommandFactory::default()
        .get_command(configuration(dir.path(), "true"), None)
        .await
        .unwrap();
    command.set_update_handler(Box::new(FailingUpdates));
    assert_eq!(command.execute().await, CommandStatus::Success);
    assert_eq!(command.status(), CommandStatus::Success);
}

#[tokio::test]
async fn terminal_status_never_changes() {
    let dir = TempDir::new().unwrap();
    let updates = RecordingUpdates::default();
    let mut command = CommandFactory::default()
        .get_command(configuration(dir.path(), "echo once"), None)
        .await
        .unwrap();
    command.set_update_handler(Box::new(updates.clone()));

    assert_eq!(command.execute().await, CommandStatus::Success);
    assert_eq!(command.execute().await, CommandStatus::Success);
    assert_eq!(command.std_output(), "once\n");
    assert_eq!(updates.messages.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reconfigured_command_runs_again() {
    let dir = TempDir::new().unwrap();
    let mut command = CommandFactory::default()
        .get_command(configuration(dir.path(), "false"), None)
        .await
        .unwrap();
    assert_eq!(command.execute().await, CommandStatus::Failed);

    command.set_configuration(configuration(dir.path(), "true"));
    assert_eq!(command.status(), CommandStatus::Processing);
    assert_eq!(command.execute().await, CommandStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_commands_run_concurrently() {
    let dirs: Vec<TempDir> = (0..4).map(|_| TempDir::new().unwrap()).collect();
    let factory = CommandFactory::default();

    let runs = dirs.iter().enumerate().map(|(index, dir)| {
        let factory = factory.clone();
        let mut config = configuration(dir.path(), "echo");
        config.set_id(index as i64).add_argument(index.to_string());
        async move {
            let mut command = factory.get_command(config, None).await.unwrap();
            command.execute().await;
            command
        }
    });
    let commands = futures::future::join_all(runs).await;

    for (index, command) in commands.iter().enumerate() {
        assert_eq!(command.status(), CommandStatus::Success);
        assert_eq!(command.std_output(), format!("{index}\n"));
    }
}

#[tokio::test]
async fn remote_configuration_without_connection_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let updates = RecordingUpdates::default();
    let mut config = configuration(dir.path(), "touch marker");
    config.set_remote_working_directory("/tmp/elsewhere");

    let mut command = CommandFactory::default().get_command(config, None).await.unwrap();
    command.set_update_handler(Box::new(updates.clone()));
    assert_eq!(command.execute().await, CommandStatus::InfoError);
    assert!(!dir.path().join("marker").exists());
    assert!(updates.messages.lock().unwrap()[0].ends_with("finished with status InfoError"));
}
