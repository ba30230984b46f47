#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use tempfile::TempDir;

/// Load address of every fixture's single `PT_LOAD` segment.
pub const BASE: u64 = 0x40_0000;

/// Size of the ELF header plus one program header. Code starts right after.
const HEADERS_LEN: u64 = 64 + 56;

/// Address of the first instruction of every fixture.
pub const ENTRY: u64 = BASE + HEADERS_LEN;

/// `mov edi, 42; mov eax, 60; syscall`: `exit(42)`.
pub const EXIT_42: &[u8] = &[
    0xbf, 0x2a, 0x00, 0x00, 0x00,
    0xb8, 0x3c, 0x00, 0x00, 0x00,
    0x0f, 0x05,
];

/// Offsets of the instructions of `EXIT_42`, in execution order.
pub const EXIT_42_TRACE: &[u64] = &[0, 5, 10];

/// Count down from 3, then `exit(0)`.
///
/// ```text
///  0: mov ecx, 3
///  5: dec ecx
///  7: jnz 5
///  9: xor edi, edi
/// 11: mov eax, 60
/// 16: syscall
/// ```
pub const LOOP: &[u8] = &[
    0xb9, 0x03, 0x00, 0x00, 0x00,
    0xff, 0xc9,
    0x75, 0xfc,
    0x31, 0xff,
    0xb8, 0x3c, 0x00, 0x00, 0x00,
    0x0f, 0x05,
];

/// Offsets of the instructions of `LOOP`, in execution order.
pub const LOOP_TRACE: &[u64] = &[0, 5, 7, 5, 7, 5, 7, 9, 11, 16];

/// `ud2`: raises `SIGILL` on its first instruction.
pub const UD2: &[u8] = &[0x0f, 0x0b];

/// Tiny static x86-64 executables, written once per test binary.
pub struct Fixtures {
    dir: TempDir,
    pub exit_42: PathBuf,
    pub looping: PathBuf,
    pub ud2: PathBuf,
    pub not_executable: PathBuf,
}

lazy_static! {
    static ref FIXTURES: Fixtures = Fixtures::create();
}

/// Fixture programs.
///
/// Every test that forks must call this first. A fixture file still open for writing
/// in one test would otherwise leak into another test's forked child, and exec of that
/// fixture could fail with `ETXTBSY`.
pub fn fixtures() -> &'static Fixtures {
    &FIXTURES
}

impl Fixtures {
    fn create() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");

        let exit_42 = write_program(dir.path(), "exit-42", EXIT_42, 0o755);
        let looping = write_program(dir.path(), "loop", LOOP, 0o755);
        let ud2 = write_program(dir.path(), "ud2", UD2, 0o755);
        let not_executable = write_program(dir.path(), "not-executable", EXIT_42, 0o644);

        Self { dir, exit_42, looping, ud2, not_executable }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Absolute addresses of a fixture trace given as code offsets.
pub fn addresses(offsets: &[u64]) -> Vec<u64> {
    offsets.iter().map(|off| ENTRY + off).collect()
}

/// Path as the argument vector `[path]`.
pub fn argv0(path: &Path) -> Vec<String> {
    vec![path.display().to_string()]
}

fn write_program(dir: &Path, name: &str, code: &[u8], mode: u32) -> PathBuf {
    let path = dir.join(name);

    fs::write(&path, elf(code)).expect("write fixture");
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod fixture");

    path
}

/// Build a static `ET_EXEC` image whose only segment maps the whole file at `BASE`.
fn elf(code: &[u8]) -> Vec<u8> {
    let file_len = HEADERS_LEN + code.len() as u64;

    let mut image = Vec::with_capacity(file_len as usize);

    // e_ident: magic, ELFCLASS64, ELFDATA2LSB, EV_CURRENT, System V ABI.
    image.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    image.extend_from_slice(&[0; 8]);
    image.extend_from_slice(&2u16.to_le_bytes()); // e_type = ET_EXEC
    image.extend_from_slice(&0x3eu16.to_le_bytes()); // e_machine = EM_X86_64
    image.extend_from_slice(&1u32.to_le_bytes()); // e_version
    image.extend_from_slice(&ENTRY.to_le_bytes()); // e_entry
    image.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
    image.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    image.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    image.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    image.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    image.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    // PT_LOAD, PF_R | PF_X.
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&5u32.to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes()); // p_offset
    image.extend_from_slice(&BASE.to_le_bytes()); // p_vaddr
    image.extend_from_slice(&BASE.to_le_bytes()); // p_paddr
    image.extend_from_slice(&file_len.to_le_bytes()); // p_filesz
    image.extend_from_slice(&file_len.to_le_bytes()); // p_memsz
    image.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align

    assert_eq!(image.len() as u64, HEADERS_LEN);

    image.extend_from_slice(code);
    image
}
