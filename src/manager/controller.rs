//! Interactive controller
//!
//! Drives the environment menu, connection attempts and the operations menu
//! as an explicit state machine:
//!
//! ```text
//! Unselected -> Connecting -> Connected (one operation per step) -> Unselected | Terminated
//!                    \-> Unselected on failure
//! ```

use std::io::{BufRead, Write};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{ControlPlane, RawConnection, Session};
use crate::config::{parse_flag, ConnectionFields, ConnectionSpec, EnvironmentSet, TlsPolicy};
use crate::utils::{ConnectionError, InterruptFlag, ManagerError, Result};

use super::console::Console;
use super::menu::{render_environment_menu, render_operations_menu, Command, EnvironmentChoice};
use super::operations;

/// Opens sessions for validated connection specs
pub trait Connector {
    type Conn: ControlPlane;

    fn connect(
        &self,
        spec: &ConnectionSpec,
        policy: &TlsPolicy,
        display_name: &str,
        timeout: Duration,
    ) -> std::result::Result<Session<Self::Conn>, ConnectionError>;
}

/// Real TCP/TLS connections
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkConnector;

impl Connector for NetworkConnector {
    type Conn = RawConnection;

    fn connect(
        &self,
        spec: &ConnectionSpec,
        policy: &TlsPolicy,
        display_name: &str,
        timeout: Duration,
    ) -> std::result::Result<Session<RawConnection>, ConnectionError> {
        Session::connect(spec, policy, display_name, timeout)
    }
}

enum State<C: ControlPlane> {
    Unselected,
    Connecting {
        spec: ConnectionSpec,
        display_name: String,
    },
    Connected(Session<C>),
    Terminated,
}

pub struct Manager<K, R, W> {
    environments: EnvironmentSet,
    connect_timeout: Duration,
    connector: K,
    console: Console<R, W>,
    interrupt: InterruptFlag,
}

impl<K, R, W> Manager<K, R, W>
where
    K: Connector,
    R: BufRead,
    W: Write,
{
    pub fn new(
        environments: EnvironmentSet,
        connect_timeout: Duration,
        connector: K,
        console: Console<R, W>,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            environments,
            connect_timeout,
            connector,
            console,
            interrupt,
        }
    }

    /// Run until the user exits or input ends
    pub fn run(&mut self) -> Result<()> {
        let mut state = State::Unselected;

        loop {
            let step = match state {
                State::Unselected => self.select_environment(),
                State::Connecting { spec, display_name } => self.connect(&spec, &display_name),
                State::Connected(session) => self.operate(session),
                State::Terminated => break,
            };

            state = match step {
                Ok(next) => next,
                Err(ManagerError::EndOfInput) => {
                    debug!("Input closed");
                    State::Terminated
                }
                Err(e) => return Err(e),
            };
        }

        writeln!(self.console.out(), "Goodbye!")?;
        Ok(())
    }

    fn select_environment(&mut self) -> Result<State<K::Conn>> {
        self.console.clear_screen()?;
        render_environment_menu(self.console.out(), &self.environments)?;

        loop {
            let input = self.console.ask("Enter your choice: ")?;
            match EnvironmentChoice::parse(&input, self.environments.len()) {
                Some(EnvironmentChoice::Named(index)) => {
                    let Some(env) = self.environments.get(index) else {
                        continue;
                    };
                    let fields = env.connection_fields();
                    let display_name = env.display_name();
                    return self.validate(&fields, |_| display_name);
                }
                Some(EnvironmentChoice::Custom) => {
                    let fields = self.prompt_custom_details()?;
                    return self.validate(&fields, |spec| {
                        format!("Custom ({}:{})", spec.host, spec.port)
                    });
                }
                Some(EnvironmentChoice::Exit) => return Ok(State::Terminated),
                None => {
                    writeln!(
                        self.console.out(),
                        "Invalid choice. Please enter a number from the list."
                    )?;
                }
            }
        }
    }

    fn validate<F>(&mut self, fields: &ConnectionFields, name: F) -> Result<State<K::Conn>>
    where
        F: FnOnce(&ConnectionSpec) -> String,
    {
        match ConnectionSpec::from_fields(fields) {
            Ok(spec) => {
                let display_name = name(&spec);
                Ok(State::Connecting { spec, display_name })
            }
            Err(e) => {
                warn!("Rejected connection details: {}", e);
                self.console
                    .failure(&format!("Invalid connection details: {}", e))?;
                self.console.pause("   Press Enter to return...")?;
                Ok(State::Unselected)
            }
        }
    }

    fn prompt_custom_details(&mut self) -> Result<ConnectionFields> {
        let console = &mut self.console;
        console.clear_screen()?;
        writeln!(console.out(), "--- Enter Custom Connection Details ---")?;

        let mut fields = ConnectionFields {
            host: Some(console.ask_trimmed("Host: ")?),
            port: Some(console.ask_trimmed("Port [6380]: ")?),
            db: Some(console.ask_trimmed("DB [0]: ")?),
            username: Some(console.ask_trimmed("Username (optional): ")?),
            password: Some(console.ask("Password: ")?),
            ..Default::default()
        };

        let tls = console.ask_trimmed("Enable TLS? (y/n) [y]: ")?;
        if parse_flag("tls", Some(&tls), true) == Ok(true) {
            let verify = console.ask_trimmed("  -> Verify TLS Certificate? (y/n) [y]: ")?;
            if parse_flag("tls_verify", Some(&verify), true) == Ok(false) {
                writeln!(
                    console.out(),
                    "  ⚠ WARNING: Disabling TLS verification is insecure."
                )?;
            } else {
                let ca = console.ask_trimmed("  -> Path to custom CA bundle? (optional): ")?;
                fields.tls_ca_certs_path = Some(ca);
            }
            fields.tls_verify = Some(verify);
        }
        fields.tls = Some(tls);
        fields.legacymode = Some(console.ask_trimmed("Enable Legacy Mode (RESP2)? (y/n) [n]: ")?);

        Ok(fields)
    }

    fn connect(&mut self, spec: &ConnectionSpec, display_name: &str) -> Result<State<K::Conn>> {
        let policy = TlsPolicy::resolve(spec);
        let pb = self
            .console
            .spinner(format!("Connecting to {}...", display_name));
        let result = self
            .connector
            .connect(spec, &policy, display_name, self.connect_timeout);
        pb.finish_and_clear();

        match result {
            Ok(mut session) => {
                info!("Connected to {} ({})", display_name, spec);
                self.console
                    .success(&format!("Successfully connected to {}.", display_name))?;
                match session.server_info() {
                    Ok(server) => writeln!(
                        self.console.out(),
                        "   Server: {} {}",
                        server.server_type,
                        server.version
                    )?,
                    Err(e) => debug!("INFO server unavailable: {}", e),
                }
                match session.db_size() {
                    Ok(keys) => writeln!(self.console.out(), "   Keys in db {}: {}", spec.db, keys)?,
                    Err(e) => debug!("DBSIZE unavailable: {}", e),
                }
                self.console.pause("   Press Enter to continue...")?;
                Ok(State::Connected(session))
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", display_name, e);
                self.console
                    .failure(&format!("Failed to connect to {}: {}", display_name, e))?;
                self.console.pause("   Press Enter to return...")?;
                Ok(State::Unselected)
            }
        }
    }

    /// Show the operations menu and run one command
    fn operate(&mut self, mut session: Session<K::Conn>) -> Result<State<K::Conn>> {
        let name = session.display_name().to_string();
        self.console.clear_screen()?;
        render_operations_menu(self.console.out(), &name)?;

        let input = self.console.ask(&format!("[{}]> ", name))?;
        let Some(command) = Command::from_choice(&input) else {
            writeln!(
                self.console.out(),
                "Invalid choice. Please enter a number from 1 to {}.",
                Command::ALL.len()
            )?;
            self.console.pause("\nPress Enter to continue...")?;
            return Ok(State::Connected(session));
        };

        let console = &mut self.console;
        let interrupt = &self.interrupt;
        let result = match command {
            Command::Back => {
                writeln!(console.out(), "Returning to environment selection...")?;
                info!("Disconnected from {}", name);
                return Ok(State::Unselected);
            }
            Command::Exit => return Ok(State::Terminated),
            Command::ListKeys => operations::list_all_keys(&mut session, console, interrupt),
            Command::DeleteKey => operations::delete_key(&mut session, console),
            Command::Flush => operations::flush_database(&mut session, console),
            Command::GetValue => operations::get_value(&mut session, console),
            Command::SetValue => operations::set_value(&mut session, console),
            Command::ScanPattern => operations::scan_pattern(&mut session, console, interrupt),
            Command::DeletePattern => operations::delete_pattern(&mut session, console, interrupt),
        };

        match result {
            Ok(()) => {}
            Err(ManagerError::EndOfInput) => return Err(ManagerError::EndOfInput),
            Err(ManagerError::Confirmation(e)) => writeln!(console.out(), "-> {}", e)?,
            Err(e) => {
                warn!("{:?} on {} failed: {}", command, name, e);
                console.failure(&e.to_string())?;
            }
        }

        console.pause("\nPress Enter to continue...")?;
        Ok(State::Connected(session))
    }
}
