//! Secure-region bookkeeping: which pointers `is_secure` vouches for, and
//! whether locked pages are visible to the kernel.

use keyring_crypto_core::hex;
use keyring_crypto_core::kdf::{derive_pbkdf2, DerivationRequest};
use keyring_crypto_core::memory::{disable_core_dumps, is_secure, SecretBuffer};
use keyring_crypto_core::registry::{CipherAlgorithm, HashAlgorithm};

fn every_byte_secure(buf: &SecretBuffer) -> bool {
    (0..buf.len()).all(|i| is_secure(buf.expose()[i..].as_ptr()))
}

#[test]
fn resize_moves_the_secure_region() {
    let mut buf = SecretBuffer::new(&[0x5a; 100]).expect("allocation should succeed");
    assert!(every_byte_secure(&buf));

    for len in [4099, 7, 300, 1] {
        buf.resize(len).expect("resize should succeed");
        assert_eq!(buf.len(), len);
        assert!(every_byte_secure(&buf), "len {len}");
    }
}

#[test]
fn dropped_buffer_is_forgotten() {
    // Odd size so the block stays in this thread's arena after free.
    let buf = SecretBuffer::new(&[0x11; 4099]).expect("allocation should succeed");
    let first = buf.expose().as_ptr() as usize;
    let last = buf.expose()[4098..].as_ptr() as usize;
    assert!(is_secure(first as *const u8));
    drop(buf);
    assert!(!is_secure(first as *const u8));
    assert!(!is_secure(last as *const u8));
}

#[test]
fn secrets_from_text_and_derivation_are_secure() {
    let decoded = hex::decode_secret("7365 6372 6574").expect("decode should succeed");
    assert_eq!(decoded.expose(), b"secret");
    assert!(every_byte_secure(&decoded));

    let request = DerivationRequest {
        password: decoded.expose(),
        salt: b"saltsalt",
        iterations: 10,
        hash: HashAlgorithm::Sha256,
        cipher: CipherAlgorithm::Aes256,
    };
    let material = derive_pbkdf2(&request, true, true).expect("derive should succeed");
    let key = material.key.expect("key requested");
    assert!(every_byte_secure(&key));
    // The IV is public and lives on the ordinary heap.
    let iv = material.iv.expect("iv requested");
    assert!(!is_secure(iv.as_ptr()));
}

#[test]
fn ordinary_memory_is_not_secure() {
    let heap = vec![0u8; 64];
    let stack = [0u8; 64];
    let text = hex::encode(b"public");
    assert!(!is_secure(heap.as_ptr()));
    assert!(!is_secure(stack.as_ptr()));
    assert!(!is_secure(text.as_ptr()));
    assert!(!is_secure(std::ptr::null()));
}

#[cfg(target_os = "linux")]
#[test]
fn locked_buffer_shows_in_vmlck() {
    let buf = SecretBuffer::zeroed(65536).expect("allocation should succeed");
    if !buf.is_mlocked() {
        eprintln!("mlock unavailable (RLIMIT_MEMLOCK), nothing to observe");
        return;
    }
    let status = std::fs::read_to_string("/proc/self/status").expect("read /proc/self/status");
    let vmlck_kb: u64 = status
        .lines()
        .find_map(|line| line.strip_prefix("VmLck:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        .expect("VmLck line");
    // Edge pages may be shared with, and unlocked by, a neighbouring buffer.
    assert!(vmlck_kb >= 56, "VmLck {vmlck_kb} kB while a 64 kB buffer is locked");
}

#[cfg(unix)]
#[test]
fn core_dumps_stay_disabled() {
    disable_core_dumps().expect("disable_core_dumps should succeed");
    // A second call cannot raise a hard limit that is already 0.
    disable_core_dumps().expect("disable_core_dumps is repeatable");

    let mut limit = libc::rlimit {
        rlim_cur: 1,
        rlim_max: 1,
    };
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_CORE, &raw mut limit) }, 0);
    assert_eq!((limit.rlim_cur, limit.rlim_max), (0, 0));
}
