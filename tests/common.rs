#![allow(dead_code)]

use std::{path::PathBuf, time::Duration};

use jobwire::{
    authorization::{AuthorizationHandler, TextFileAuthorization},
    ConnectionConfiguration, ConnectionManager, ManagerOptions,
};
use tempfile::TempDir;
use testcontainers::{core::ContainerPort, runners::AsyncRunner, ContainerAsync, GenericImage};
use uuid::Uuid;

pub fn get_tmp_path() -> PathBuf {
    PathBuf::from(format!("/tmp/{}", Uuid::new_v4()))
}

/// Password configuration for the test image's root account.
pub fn root_configuration(name: &str, hostname: &str, port: u16) -> ConnectionConfiguration {
    let mut handler = TextFileAuthorization::new();
    handler.set_hostname(hostname.into());
    handler.set_username("root".into());
    handler.set_port(port);
    handler.set_password("root123".into());
    ConnectionConfiguration::from_handler(name, &handler)
}

pub struct TestServer {
    pub port: u16,
    pub manager: ConnectionManager,
    _known_hosts: TempDir,
    _container: ContainerAsync<GenericImage>,
}

impl TestServer {
    pub async fn setup() -> TestServer {
        let container = GenericImage::new("ssh_server", "latest")
            .with_exposed_port(ContainerPort::Tcp(22))
            .start()
            .await
            .expect("Could not start SSH container");
        let ports = container
            .ports()
            .await
            .expect("Could not get SSH container ports");
        let port = ports
            .map_to_host_port_ipv4(ContainerPort::Tcp(22))
            .expect("Could not get SSH container port corresponding to 22");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let known_hosts = tempfile::tempdir().expect("Could not create known hosts dir");
        let options = ManagerOptions {
            known_hosts: known_hosts.path().join("known_hosts"),
            strict_host_key_checking: false,
            ..Default::default()
        };

        TestServer {
            port,
            manager: ConnectionManager::with_options(options),
            _known_hosts: known_hosts,
            _container: container,
        }
    }

    pub fn configuration(&self, name: &str) -> ConnectionConfiguration {
        root_configuration(name, "localhost", self.port)
    }

    /// The container's own sshd, as seen from inside the container.
    pub fn inner_configuration(&self, name: &str) -> ConnectionConfiguration {
        root_configuration(name, "127.0.0.1", 22)
    }
}
