//! Menu choices and rendering

use std::io::{self, Write};

use crate::config::EnvironmentSet;

/// An entry of the operations menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ListKeys,
    DeleteKey,
    Flush,
    GetValue,
    SetValue,
    ScanPattern,
    DeletePattern,
    Back,
    Exit,
}

impl Command {
    /// Menu order; the choice number is the position plus one
    pub const ALL: [Command; 9] = [
        Command::ListKeys,
        Command::DeleteKey,
        Command::Flush,
        Command::GetValue,
        Command::SetValue,
        Command::ScanPattern,
        Command::DeletePattern,
        Command::Back,
        Command::Exit,
    ];

    pub fn from_choice(input: &str) -> Option<Self> {
        let n: usize = input.trim().parse().ok()?;
        n.checked_sub(1).and_then(|i| Self::ALL.get(i)).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Command::ListKeys => "Get all keys",
            Command::DeleteKey => "Delete a specific key",
            Command::Flush => "DANGER: Delete ALL keys (FLUSH)",
            Command::GetValue => "Get the value for a key",
            Command::SetValue => "Set a new key-value pair",
            Command::ScanPattern => "Scan keys by pattern",
            Command::DeletePattern => "Delete keys by pattern",
            Command::Back => "Go back (select another environment)",
            Command::Exit => "Exit",
        }
    }
}

/// Result of the environment selection prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentChoice {
    /// Index into the environment set
    Named(usize),
    Custom,
    Exit,
}

impl EnvironmentChoice {
    /// Map a typed number onto `count` environments followed by Custom and Exit
    pub fn parse(input: &str, count: usize) -> Option<Self> {
        let n: usize = input.trim().parse().ok()?;
        match n {
            0 => None,
            n if n <= count => Some(EnvironmentChoice::Named(n - 1)),
            n if n == count + 1 => Some(EnvironmentChoice::Custom),
            n if n == count + 2 => Some(EnvironmentChoice::Exit),
            _ => None,
        }
    }
}

pub fn render_environment_menu<W: Write>(out: &mut W, environments: &EnvironmentSet) -> io::Result<()> {
    writeln!(out, "--- Please select a Redis Environment ---")?;
    for (i, env) in environments.iter().enumerate() {
        writeln!(out, "  {}) {} ({})", i + 1, env.display_name(), env.address_hint())?;
    }
    writeln!(out, "{}", "-".repeat(25))?;
    writeln!(out, "  {}) Enter Custom Connection Details", environments.len() + 1)?;
    writeln!(out, "  {}) Exit", environments.len() + 2)?;
    writeln!(out, "-----------------------------------------")
}

pub fn render_operations_menu<W: Write>(out: &mut W, display_name: &str) -> io::Result<()> {
    writeln!(out, "--- Connected to {} ---", display_name)?;
    for (i, command) in Command::ALL.iter().enumerate() {
        writeln!(out, "  {}) {}", i + 1, command.label())?;
    }
    writeln!(out, "------------------------------------")
}
