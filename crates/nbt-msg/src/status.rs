//! The NTSTATUS registry: a process-wide, extensible table mapping
//! 32-bit status codes to their standard name and message text, plus
//! the subfield decomposition ([MS-ERREF] 2.3) used to interpret a
//! code's severity and originating facility.
//!
//! The built-in table seeds lazily on first use from the codes known
//! to appear in SMB2/3 traffic; callers may [`register`] additional
//! codes (e.g. vendor-specific extensions) at any time.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A registered NTSTATUS code: its numeric value, standard name, and
/// descriptive message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtStatusEntry {
    pub code: u32,
    pub name: String,
    pub message: String,
}

/// Severity carried in the top two bits of an NTSTATUS code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => Self::Success,
            1 => Self::Info,
            2 => Self::Warning,
            _ => Self::Error,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

/// The `(severity, customer, reserved, facility, sub_code)` subfields
/// of an NTSTATUS code, per [MS-ERREF] 2.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubCodes {
    pub severity: Severity,
    pub customer: bool,
    pub reserved: bool,
    pub facility: u16,
    pub sub_code: u16,
}

/// Decompose a raw NTSTATUS code into its subfields.
pub fn sub_codes(code: u32) -> SubCodes {
    SubCodes {
        severity: Severity::from_bits(code >> 30),
        customer: code & 0x2000_0000 != 0,
        reserved: code & 0x1000_0000 != 0,
        facility: ((code >> 16) & 0x0FFF) as u16,
        sub_code: (code & 0xFFFF) as u16,
    }
}

type Registry = RwLock<HashMap<u32, Arc<NtStatusEntry>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::with_capacity(BUILTIN.len());
        for &(code, name, message) in BUILTIN {
            map.insert(
                code,
                Arc::new(NtStatusEntry {
                    code,
                    name: name.to_string(),
                    message: message.to_string(),
                }),
            );
        }
        RwLock::new(map)
    })
}

/// Look up a registered NTSTATUS code. Returns `None` if it has not
/// been registered (via the built-in table or a prior [`register`] call).
pub fn lookup(code: u32) -> Option<Arc<NtStatusEntry>> {
    registry().read().unwrap().get(&code).cloned()
}

/// Register a new NTSTATUS code (or replace an existing registration),
/// making it visible to subsequent [`lookup`] calls process-wide.
pub fn register(code: u32, name: impl Into<String>, message: impl Into<String>) -> Arc<NtStatusEntry> {
    let entry = Arc::new(NtStatusEntry {
        code,
        name: name.into(),
        message: message.into(),
    });
    registry().write().unwrap().insert(code, entry.clone());
    entry
}

/// Codes known to appear in SMB traffic, transcribed from the
/// reference NTSTATUS table this library's error handling is modeled
/// on. Extend via [`register`] rather than editing this list.
static BUILTIN: &[(u32, &str, &str)] = &[
    (0x0000_0000, "STATUS_SUCCESS", "The operation completed successfully."),
    (0x0000_0103, "STATUS_PENDING", "The operation that was requested is pending completion."),
    (0x0000_0104, "STATUS_REPARSE", "A reparse should be performed by the Object Manager because the name of the file resulted in a symbolic link."),
    (0x0000_010B, "STATUS_NOTIFY_CLEANUP", "Indicates that a notify change request has been completed due to closing the handle that made the notify change request."),
    (0x0000_010C, "STATUS_NOTIFY_ENUM_DIR", "Indicates that a notify change request is being completed and that the information is not being returned in the caller's buffer. The caller now needs to enumerate the files to find the changes."),
    (0x8000_0005, "STATUS_BUFFER_OVERFLOW", "Buffer Overflow; The data was too large to fit into the specified buffer."),
    (0x8000_0006, "STATUS_NO_MORE_FILES", "No more files were found which match the file specification."),
    (0x8000_0014, "STATUS_EA_LIST_INCONSISTENT", "The extended attribute (EA) list is inconsistent."),
    (0x8000_001A, "STATUS_NO_MORE_ENTRIES", "No more entries are available from an enumeration operation."),
    (0x8000_002D, "STATUS_STOPPED_ON_SYMLINK", "The create operation stopped after reaching a symbolic link."),
    (0xC000_0001, "STATUS_UNSUCCESSFUL", "Operation Failed; The requested operation was unsuccessful."),
    (0xC000_0003, "STATUS_INVALID_INFO_CLASS", "Invalid Parameter; The specified information class is not a valid information class for the specified object."),
    (0xC000_0004, "STATUS_INFO_LENGTH_MISMATCH", "The specified information record length does not match the length that is required for the specified information class."),
    (0xC000_0008, "STATUS_INVALID_HANDLE", "An invalid HANDLE was specified."),
    (0xC000_000D, "STATUS_INVALID_PARAMETER", "An invalid parameter was passed to a service or function."),
    (0xC000_000F, "STATUS_NO_SUCH_FILE", "File Not Found; The file does not exist."),
    (0xC000_0010, "STATUS_INVALID_DEVICE_REQUEST", "The specified request is not a valid operation for the target device."),
    (0xC000_0011, "STATUS_END_OF_FILE", "The end-of-file marker has been reached. There is no valid data in the file beyond this marker."),
    (0xC000_0016, "STATUS_MORE_PROCESSING_REQUIRED", "Still Busy; The specified I/O request packet (IRP) cannot be disposed of because the I/O operation is not complete."),
    (0xC000_0017, "STATUS_NO_MEMORY", "Insufficient Quota; Not enough virtual memory or paging file quota is available to complete the specified operation."),
    (0xC000_0022, "STATUS_ACCESS_DENIED", "A process has requested access to an object but has not been granted those access rights."),
    (0xC000_0023, "STATUS_BUFFER_TOO_SMALL", "The buffer is too small to contain the entry. No information has been written to the buffer."),
    (0xC000_0033, "STATUS_OBJECT_NAME_INVALID", "The object name is invalid."),
    (0xC000_0034, "STATUS_OBJECT_NAME_NOT_FOUND", "The object name is not found."),
    (0xC000_0035, "STATUS_OBJECT_NAME_COLLISION", "The object name already exists."),
    (0xC000_004F, "STATUS_EAS_NOT_SUPPORTED", "An operation involving EAs failed because the file system does not support EAs."),
    (0xC000_0051, "STATUS_NONEXISTENT_EA_ENTRY", "An EA operation failed because the name or EA index is invalid."),
    (0xC000_0054, "STATUS_FILE_LOCK_CONFLICT", "A requested read/write cannot be granted due to a conflicting file lock."),
    (0xC000_0055, "STATUS_LOCK_NOT_GRANTED", "A requested file lock cannot be granted due to other existing locks."),
    (0xC000_005F, "STATUS_NO_SUCH_LOGON_SESSION", "A specified logon session does not exist. It may already have been terminated."),
    (0xC000_0064, "STATUS_NO_SUCH_USER", "The specified account does not exist."),
    (0xC000_006A, "STATUS_WRONG_PASSWORD", "When trying to update a password, this return status indicates that the value provided as the current password is not correct."),
    (0xC000_006C, "STATUS_PASSWORD_RESTRICTION", "When trying to update a password, this status indicates that some password update rule has been violated. For example, the password may not meet length criteria."),
    (0xC000_006D, "STATUS_LOGON_FAILURE", "The attempted logon is invalid. This is either due to a bad username or authentication information."),
    (0xC000_006F, "STATUS_INVALID_LOGON_HOURS", "The user account has time restrictions and may not be logged onto at this time."),
    (0xC000_0070, "STATUS_INVALID_WORKSTATION", "The user account is restricted so that it may not be used to log on from the source workstation."),
    (0xC000_0071, "STATUS_PASSWORD_EXPIRED", "The user account password has expired."),
    (0xC000_0073, "STATUS_NONE_MAPPED", "None of the information to be translated has been translated."),
    (0xC000_007C, "STATUS_NO_TOKEN", "An attempt was made to reference a token that does not exist. This is typically done by referencing the token that is associated with a thread when the thread is not impersonating a client."),
    (0xC000_007E, "STATUS_RANGE_NOT_LOCKED", "The range specified in NtUnlockFile was not locked."),
    (0xC000_007F, "STATUS_DISK_FULL", "An operation failed because the disk was full."),
    (0xC000_009A, "STATUS_INSUFFICIENT_RESOURCES", "Insufficient system resources exist to complete the API."),
    (0xC000_00B5, "STATUS_IO_TIMEOUT", "Device Timeout; The specified I/O operation was not completed before the time-out period expired."),
    (0xC000_00B6, "STATUS_FILE_FORCED_CLOSED", "The specified file has been closed by another process."),
    (0xC000_00BA, "STATUS_FILE_IS_A_DIRECTORY", "The file that was specified as a target is a directory, and the caller specified that it could be anything but a directory."),
    (0xC000_00BB, "STATUS_NOT_SUPPORTED", "The request is not supported."),
    (0xC000_00C3, "STATUS_INVALID_NETWORK_RESPONSE", "The network responded incorrectly."),
    (0xC000_00C9, "STATUS_NETWORK_NAME_DELETED", "The network name was deleted."),
    (0xC000_00D0, "STATUS_REQUEST_NOT_ACCEPTED", "No more connections can be made to this remote computer at this time because the computer has already accepted the maximum number of connections."),
    (0xC000_00DF, "STATUS_NO_SUCH_DOMAIN", "The specified domain did not exist."),
    (0xC000_00E3, "STATUS_INVALID_OPLOCK_PROTOCOL", "An error status returned when an invalid opportunistic lock (oplock) acknowledgment is received by a file system."),
    (0xC000_00E5, "STATUS_INTERNAL_ERROR", "An internal error occurred."),
    (0xC000_0102, "STATUS_FILE_CORRUPT_ERROR", "Corrupt File; The file or directory is corrupt and unreadable."),
    (0xC000_0103, "STATUS_NOT_A_DIRECTORY", "A requested opened file is not a directory."),
    (0xC000_0120, "STATUS_CANCELLED", "The I/O request was canceled."),
    (0xC000_0128, "STATUS_FILE_CLOSED", "An I/O request other than close and several other special case operations was attempted using a file object that had already been closed."),
    (0xC000_014B, "STATUS_PIPE_BROKEN", "The pipe operation has failed because the other end of the pipe has been closed."),
    (0xC000_015B, "STATUS_LOGON_TYPE_NOT_GRANTED", "A user has requested a type of logon (for example, interactive or network) that has not been granted. An administrator has control over who may logon interactively and through the network."),
    (0xC000_0184, "STATUS_INVALID_DEVICE_STATE", "The device is not in a valid state to perform this request."),
    (0xC000_018D, "STATUS_TRUSTED_RELATIONSHIP_FAILURE", "The logon request failed because the trust relationship between this workstation and the primary domain failed."),
    (0xC000_0190, "STATUS_TRUST_FAILURE", "The network logon failed. This may be because the validation authority cannot be reached."),
    (0xC000_0192, "STATUS_NETLOGON_NOT_STARTED", "An attempt was made to logon, but the NetLogon service was not started."),
    (0xC000_019C, "STATUS_FS_DRIVER_REQUIRED", "A volume has been accessed for which a file system driver is required that has not yet been loaded."),
    (0xC000_0203, "STATUS_USER_SESSION_DELETED", "The remote user session has been deleted."),
    (0xC000_020C, "STATUS_CONNECTION_DISCONNECTED", "The transport connection is now disconnected."),
    (0xC000_0224, "STATUS_PASSWORD_MUST_CHANGE", "The user password must be changed before logging on the first time."),
    (0xC000_022A, "STATUS_DUPLICATE_OBJECTID", "The attempt to insert the ID in the index failed because the ID is already in the index."),
    (0xC000_0233, "STATUS_DOMAIN_CONTROLLER_NOT_FOUND", "A domain controller for this domain was not found."),
    (0xC000_023C, "STATUS_NETWORK_UNREACHABLE", "The remote network is not reachable by the transport."),
    (0xC000_026E, "STATUS_VOLUME_DISMOUNTED", "An operation was attempted to a volume after it was dismounted."),
    (0xC000_02F9, "STATUS_PKINIT_NAME_MISMATCH", "The client certificate does not contain a valid UPN, or does not match the client name in the logon request."),
    (0xC000_0320, "STATUS_PKINIT_FAILURE", "The Kerberos protocol encountered an error while validating the KDC certificate during smart card logon."),
    (0xC000_035C, "STATUS_NETWORK_SESSION_EXPIRED", "The client session has expired; The client must re-authenticate to continue accessing the remote resources."),
    (0xC000_0380, "STATUS_SMARTCARD_WRONG_PIN", "An incorrect PIN was presented to the smart card."),
    (0xC000_0381, "STATUS_SMARTCARD_CARD_BLOCKED", "The smart card is blocked."),
    (0xC000_0383, "STATUS_SMARTCARD_NO_CARD", "No smart card is available."),
    (0xC000_0388, "STATUS_DOWNGRADE_DETECTED", "The system detected a possible attempt to compromise security. Ensure that you can contact the server that authenticated you."),
    (0xC000_038C, "STATUS_PKINIT_CLIENT_FAILURE", "The smart card certificate used for authentication was not trusted. Contact your system administrator."),
    (0xC000_038F, "STATUS_SMARTCARD_SILENT_CONTEXT", "The smart card provider could not perform the action because the context was acquired as silent."),
    (0xC000_0466, "STATUS_SERVER_UNAVAILABLE", "The file server is temporarily unavailable."),
    (0xC000_0467, "STATUS_FILE_NOT_AVAILABLE", "The file is temporarily unavailable."),
    (0xC000_A100, "STATUS_HASH_NOT_SUPPORTED", "Hash generation for the specified version and hash type is not enabled on server."),
    (0xC000_A101, "STATUS_HASH_NOT_PRESENT", "The hash requests is not present or not up to date with the current file contents."),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_a_builtin_code() {
        let entry = lookup(0xC000_000F).unwrap();
        assert_eq!(entry.name, "STATUS_NO_SUCH_FILE");
    }

    #[test]
    fn unregistered_code_is_none() {
        assert!(lookup(0xDEAD_BEEF).is_none());
    }

    #[test]
    fn register_adds_a_new_code() {
        let entry = register(0xA000_01FF, "MY_STATUS_CODE", "Something annoying happened.");
        assert_eq!(lookup(0xA000_01FF).unwrap(), entry);
    }

    #[test]
    fn decomposes_severity_and_facility() {
        let sc = sub_codes(0xC000_0467);
        assert_eq!(sc.severity, Severity::Error);
        assert_eq!(sc.facility, 0);
        assert_eq!(sc.sub_code, 0x0467);
    }

    #[test]
    fn severity_name_matches_table() {
        assert_eq!(sub_codes(0x8000_0005).severity.name(), "Warning");
        assert_eq!(sub_codes(0x0000_0103).severity.name(), "Info");
        assert_eq!(sub_codes(0x0000_0000).severity.name(), "Success");
    }
}
