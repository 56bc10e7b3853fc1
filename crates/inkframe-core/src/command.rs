//! Storage operations behind the serial console commands.

use core::fmt::{self, Write};

use heapless::Vec;

use crate::{
    arbiter::{ArbiterError, HostLink, StorageArbiter},
    storage::{Capacity, FileStore, StorageError},
};

/// Metadata file kept in the volume root.
pub const METADATA_FILE: &str = "README.MD";
/// Text written by the `write` command.
pub const METADATA_CONTENTS: &str = "Mass Storage Devices are one of the most common USB devices. \
It use Mass Storage Class (MSC) that allow access to their internal data storage.\n\
In this example, ESP chip will be recognised by host (PC) as Mass Storage Device.\n\
Upon connection to USB host (PC), the example application will initialize the storage module \
and then the storage will be seen as removable device on PC.\n";
/// Most metadata bytes echoed by `read`.
pub const METADATA_READ_BYTES: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    Read,
    Write,
    Size,
    Expose,
    Mount,
    Status,
    Help,
    Exit,
}

impl Command {
    pub const ALL: [Self; 8] = [
        Self::Read,
        Self::Write,
        Self::Size,
        Self::Expose,
        Self::Mount,
        Self::Status,
        Self::Help,
        Self::Exit,
    ];

    /// Parses one console line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(word))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Size => "size",
            Self::Expose => "expose",
            Self::Mount => "mount",
            Self::Status => "status",
            Self::Help => "help",
            Self::Exit => "exit",
        }
    }

    pub const fn help(self) -> &'static str {
        match self {
            Self::Read => "print README.MD from the card",
            Self::Write => "create README.MD if it is missing",
            Self::Size => "show storage capacity",
            Self::Expose => "hand the card to the USB host",
            Self::Mount => "take the card back from the USB host",
            Self::Status => "show whether the card is exposed over USB",
            Self::Help => "list commands",
            Self::Exit => "release storage and stop the gallery",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandOutput {
    Metadata {
        text: Vec<u8, METADATA_READ_BYTES>,
        truncated: bool,
    },
    MetadataWritten {
        created: bool,
    },
    Capacity(Capacity),
    Exposed,
    Mounted,
    Status {
        exposed: bool,
    },
    Help,
    Exiting,
}

impl CommandOutput {
    /// Writes the console report for this output.
    pub fn write_to<W: Write>(&self, out: &mut W) -> fmt::Result {
        match self {
            Self::Metadata { text, truncated } => {
                match core::str::from_utf8(text) {
                    Ok(text) => out.write_str(text)?,
                    Err(_) => write!(out, "<{} bytes of binary data>", text.len())?,
                }
                if *truncated {
                    write!(out, "\n<truncated at {} bytes>", METADATA_READ_BYTES)?;
                }
                Ok(())
            }
            Self::MetadataWritten { created: true } => write!(out, "{} created", METADATA_FILE),
            Self::MetadataWritten { created: false } => {
                write!(out, "{} already present", METADATA_FILE)
            }
            Self::Capacity(capacity) => write!(
                out,
                "Storage Capacity {}MB ({} sectors of {} bytes)",
                capacity.megabytes(),
                capacity.sector_count,
                capacity.sector_size
            ),
            Self::Exposed => out.write_str("storage exposed over USB"),
            Self::Mounted => out.write_str("storage mounted by application"),
            Self::Status { exposed } => write!(
                out,
                "storage exposed over USB: {}",
                if *exposed { "Yes" } else { "No" }
            ),
            Self::Help => {
                for command in Command::ALL {
                    writeln!(out, "{:<8}{}", command.name(), command.help())?;
                }
                Ok(())
            }
            Self::Exiting => out.write_str("Application Exiting"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandError {
    Arbiter(ArbiterError),
    Storage(StorageError),
}

impl CommandError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arbiter(err) => err.as_str(),
            Self::Storage(err) => err.as_str(),
        }
    }
}

impl From<ArbiterError> for CommandError {
    fn from(err: ArbiterError) -> Self {
        Self::Arbiter(err)
    }
}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

pub fn execute<S, L>(
    arbiter: &mut StorageArbiter<S, L>,
    command: Command,
) -> Result<CommandOutput, CommandError>
where
    S: FileStore,
    L: HostLink,
{
    match command {
        Command::Read => {
            let storage = arbiter.storage()?;
            let len = storage.file_len(METADATA_FILE)?;
            let mut text = Vec::new();
            let _ = text.resize(len.min(METADATA_READ_BYTES), 0);
            let read = storage.read_file(METADATA_FILE, &mut text)?;
            text.truncate(read);
            Ok(CommandOutput::Metadata {
                text,
                truncated: len > METADATA_READ_BYTES,
            })
        }
        Command::Write => {
            let created = arbiter
                .storage()?
                .create_if_absent(METADATA_FILE, METADATA_CONTENTS.as_bytes())?;
            Ok(CommandOutput::MetadataWritten { created })
        }
        Command::Size => Ok(CommandOutput::Capacity(arbiter.storage()?.capacity()?)),
        Command::Expose => {
            arbiter.request_host_exposure()?;
            Ok(CommandOutput::Exposed)
        }
        Command::Mount => {
            arbiter.request_application_ownership()?;
            Ok(CommandOutput::Mounted)
        }
        Command::Status => Ok(CommandOutput::Status {
            exposed: arbiter.is_host_exposed(),
        }),
        Command::Help => Ok(CommandOutput::Help),
        Command::Exit => {
            arbiter.release();
            Ok(CommandOutput::Exiting)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::string::String;

    use super::*;
    use crate::testing::{MemoryStore, RecordingLink};

    fn arbiter(store: MemoryStore) -> StorageArbiter<MemoryStore, RecordingLink> {
        StorageArbiter::new(store, RecordingLink::default())
    }

    fn report(output: &CommandOutput) -> String {
        let mut text = String::new();
        output.write_to(&mut text).unwrap();
        text
    }

    #[test]
    fn parses_known_commands_only() {
        assert_eq!(Command::parse("expose"), Some(Command::Expose));
        assert_eq!(Command::parse("  Status\r"), Some(Command::Status));
        assert_eq!(Command::parse("format"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn read_reports_missing_metadata() {
        let mut arbiter = arbiter(MemoryStore::new());

        assert_eq!(
            execute(&mut arbiter, Command::Read),
            Err(CommandError::Storage(StorageError::NotFound))
        );
    }

    #[test]
    fn write_then_read_returns_metadata_text() {
        let mut arbiter = arbiter(MemoryStore::new());

        assert_eq!(
            execute(&mut arbiter, Command::Write),
            Ok(CommandOutput::MetadataWritten { created: true })
        );
        assert_eq!(
            execute(&mut arbiter, Command::Write),
            Ok(CommandOutput::MetadataWritten { created: false })
        );

        let output = execute(&mut arbiter, Command::Read).unwrap();
        let text = report(&output);
        assert_eq!(text, METADATA_CONTENTS);
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("Mass Storage Devices are one of the most common USB devices."));
    }

    #[test]
    fn long_metadata_is_truncated() {
        let long = [b'x'; METADATA_READ_BYTES + 10];
        let mut arbiter = arbiter(MemoryStore::new().with_file(METADATA_FILE, &long));

        match execute(&mut arbiter, Command::Read).unwrap() {
            CommandOutput::Metadata { text, truncated } => {
                assert_eq!(text.len(), METADATA_READ_BYTES);
                assert!(truncated);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn storage_commands_fail_while_exposed() {
        let mut arbiter = arbiter(MemoryStore::new());
        execute(&mut arbiter, Command::Expose).unwrap();

        for command in [Command::Read, Command::Write, Command::Size] {
            assert_eq!(
                execute(&mut arbiter, command),
                Err(CommandError::Storage(StorageError::Unavailable))
            );
        }
        assert_eq!(
            execute(&mut arbiter, Command::Expose),
            Err(CommandError::Arbiter(ArbiterError::AlreadyExposed))
        );
        assert_eq!(
            report(&execute(&mut arbiter, Command::Status).unwrap()),
            "storage exposed over USB: Yes"
        );

        execute(&mut arbiter, Command::Mount).unwrap();
        assert_eq!(
            report(&execute(&mut arbiter, Command::Status).unwrap()),
            "storage exposed over USB: No"
        );
    }

    #[test]
    fn size_reports_megabytes() {
        let mut arbiter = arbiter(MemoryStore::new());

        let output = execute(&mut arbiter, Command::Size).unwrap();

        assert!(report(&output).starts_with("Storage Capacity 7580MB"));
    }

    #[test]
    fn exit_releases_storage() {
        let mut arbiter = arbiter(MemoryStore::new());

        assert_eq!(execute(&mut arbiter, Command::Exit), Ok(CommandOutput::Exiting));
        assert!(arbiter.store().released);
    }
}
