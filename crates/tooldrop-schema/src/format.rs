//! Archive formats and executable signatures.

use serde::{Deserialize, Serialize};

/// ELF header magic (Linux and most Unix executables).
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Mach-O magics: 32/64-bit, big and little endian.
pub const MACHO_MAGICS: [[u8; 4]; 4] = [
    [0xFE, 0xED, 0xFA, 0xCE],
    [0xFE, 0xED, 0xFA, 0xCF],
    [0xCE, 0xFA, 0xED, 0xFE],
    [0xCF, 0xFA, 0xED, 0xFE],
];

/// PE/COFF DOS stub magic (Windows executables).
pub const PE_MAGIC: [u8; 2] = *b"MZ";

/// Closed set of archive formats the installer knows how to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// Zip archive (`.zip`).
    Zip,
    /// Gzip-compressed tar archive (`.tar.gz`, `.tgz`).
    TarGz,
    /// A single gzip-compressed file (`.gz` that is not a tarball).
    Gzip,
}

impl ArchiveFormat {
    /// Infer the format from a file name. Case-insensitive.
    ///
    /// Returns `None` for anything outside the supported set; callers fail
    /// instead of guessing.
    #[allow(clippy::case_sensitive_file_extension_comparisons)]
    pub fn from_name(name: &str) -> Option<Self> {
        let n = name.to_lowercase();
        if n.ends_with(".tar.gz") || n.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if n.ends_with(".zip") {
            Some(Self::Zip)
        } else if n.ends_with(".gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    /// Shell command a user can run to unpack the archive by hand.
    pub fn manual_command(self, file: &str) -> String {
        match self {
            Self::Zip => format!("unzip '{file}'"),
            Self::TarGz => format!("tar -xzf '{file}'"),
            Self::Gzip => format!("gunzip -k '{file}'"),
        }
    }
}

/// Executable container formats recognized by their leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutableFormat {
    /// Executable and Linkable Format.
    Elf,
    /// Mach-O (macOS).
    MachO,
    /// Portable Executable (Windows).
    Pe,
}

impl ExecutableFormat {
    /// Classify a file by its first bytes. Extensions are never consulted.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(&ELF_MAGIC) {
            Some(Self::Elf)
        } else if MACHO_MAGICS.iter().any(|m| header.starts_with(m)) {
            Some(Self::MachO)
        } else if header.starts_with(&PE_MAGIC) {
            Some(Self::Pe)
        } else {
            None
        }
    }
}
