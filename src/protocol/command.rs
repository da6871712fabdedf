//! ceserver command identifiers
//!
//! Every request starts with one of these bytes. Only the commands the
//! client actually issues have request/response layouts in
//! [`codec`](super::codec); the rest are listed so traces and tooling can
//! name what they see on the wire.

use std::fmt;

/// Command identifier, sent as a single byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    GetVersion = 0,
    CloseConnection = 1,
    TerminateServer = 2,
    OpenProcess = 3,
    CreateToolhelp32Snapshot = 4,
    Process32First = 5,
    Process32Next = 6,
    CloseHandle = 7,
    VirtualQueryEx = 8,
    ReadProcessMemory = 9,
    /// `{i32 handle, i64 address, i32 size}` + data; answers `{i32 written}`. Not issued.
    WriteProcessMemory = 10,
    StartDebug = 11,
    StopDebug = 12,
    WaitForDebugEvent = 13,
    ContinueFromDebugEvent = 14,
    SetBreakpoint = 15,
    RemoveBreakpoint = 16,
    /// `{u64 hProcess, i32 tid}`; answers `{i32 result}`. Not issued.
    SuspendThread = 17,
    /// `{u64 hProcess, i32 tid}`; answers `{i32 result}`. Not issued.
    ResumeThread = 18,
    GetThreadContext = 19,
    SetThreadContext = 20,
    GetArchitecture = 21,
    Module32First = 22,
    Module32Next = 23,
    GetSymbolListFromFile = 24,
    LoadExtension = 25,
    /// `{u64 hProcess, u64 preferedBase, u32 size, u32 protection}`; answers `{u64 address}`. Not issued.
    Alloc = 26,
    /// `{u64 hProcess, u64 address, u32 size}`; answers `{u32 result}`. Not issued.
    Free = 27,
    /// `{u64 hProcess, u64 startaddress, u64 parameter}`; answers `{u64 threadhandle}`. Not issued.
    CreateThread = 28,
    LoadModule = 29,
    SpeedhackSetSpeed = 30,
    VirtualQueryExFull = 31,
    GetRegionInfo = 32,
    GetAbi = 33,
    SetConnectionName = 34,
    CreateToolhelp32SnapshotEx = 35,
    ChangeMemoryProtection = 36,
    AobScan = 200,
}

impl Command {
    /// Wire identifier
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Looks up a command by its wire identifier
    pub fn from_id(id: u8) -> Option<Self> {
        use Command::*;
        Some(match id {
            0 => GetVersion,
            1 => CloseConnection,
            2 => TerminateServer,
            3 => OpenProcess,
            4 => CreateToolhelp32Snapshot,
            5 => Process32First,
            6 => Process32Next,
            7 => CloseHandle,
            8 => VirtualQueryEx,
            9 => ReadProcessMemory,
            10 => WriteProcessMemory,
            11 => StartDebug,
            12 => StopDebug,
            13 => WaitForDebugEvent,
            14 => ContinueFromDebugEvent,
            15 => SetBreakpoint,
            16 => RemoveBreakpoint,
            17 => SuspendThread,
            18 => ResumeThread,
            19 => GetThreadContext,
            20 => SetThreadContext,
            21 => GetArchitecture,
            22 => Module32First,
            23 => Module32Next,
            24 => GetSymbolListFromFile,
            25 => LoadExtension,
            26 => Alloc,
            27 => Free,
            28 => CreateThread,
            29 => LoadModule,
            30 => SpeedhackSetSpeed,
            31 => VirtualQueryExFull,
            32 => GetRegionInfo,
            33 => GetAbi,
            34 => SetConnectionName,
            35 => CreateToolhelp32SnapshotEx,
            36 => ChangeMemoryProtection,
            200 => AobScan,
            _ => return None,
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.id())
    }
}

/// `dwFlags` bits for snapshot creation
pub mod snapshot_flags {
    pub const TH32CS_SNAPPROCESS: u32 = 0x0000_0002;
    pub const TH32CS_SNAPTHREAD: u32 = 0x0000_0004;
    pub const TH32CS_SNAPMODULE: u32 = 0x0000_0008;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert_eq!(Command::GetVersion.id(), 0);
        assert_eq!(Command::OpenProcess.id(), 3);
        assert_eq!(Command::CloseHandle.id(), 7);
        assert_eq!(Command::ReadProcessMemory.id(), 9);
        assert_eq!(Command::Module32First.id(), 22);
        assert_eq!(Command::CreateToolhelp32SnapshotEx.id(), 0x23);
        assert_eq!(Command::AobScan.id(), 200);
    }

    #[test]
    fn test_from_id_inverts_id() {
        for id in 0..=u8::MAX {
            if let Some(command) = Command::from_id(id) {
                assert_eq!(command.id(), id);
            }
        }
        assert_eq!(Command::from_id(37), None);
        assert_eq!(Command::from_id(255), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::Process32Next.to_string(), "Process32Next(6)");
    }
}
