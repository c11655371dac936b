use tiercache_vault::{CacheVault, SEALED_OVERHEAD, VaultError};

fn setup_vault() -> CacheVault {
    CacheVault::builder()
        .master_key(b"an-exemplary-32-byte-master-key!")
        .expect("master key accepted")
        .build()
        .expect("vault builds")
}

#[test]
fn test_roundtrip_binds_namespace_and_key() {
    let vault = setup_vault();
    let envelope = b"\x01\x04bin1checksum-and-payload".to_vec();

    let sealed = vault.seal("profiles", &envelope, b"ns:profiles:func:get:args:ab12").unwrap();
    let opened = vault.open("profiles", &sealed, b"ns:profiles:func:get:args:ab12").unwrap();
    assert_eq!(opened, envelope);
}

#[test]
fn test_short_master_key_rejected() {
    let result = CacheVault::builder().master_key(b"too-short");
    assert!(matches!(result, Err(VaultError::InvalidConfiguration { .. })));
}

#[test]
fn test_every_bit_flip_fails_authentication() {
    let vault = setup_vault();
    let sealed = vault.seal("ns", b"sensitive envelope bytes", b"cache-key").unwrap();

    for pos in 0..sealed.len() {
        let mut tampered = sealed.clone();
        tampered[pos] ^= 0x01;
        assert!(
            vault.open("ns", &tampered, b"cache-key").is_err(),
            "bit flip at byte {pos} must not authenticate"
        );
    }
}

#[test]
fn test_ciphertexts_differ_for_identical_plaintext() {
    let vault = setup_vault();
    let a = vault.seal("ns", b"same bytes", b"same-key").unwrap();
    let b = vault.seal("ns", b"same bytes", b"same-key").unwrap();

    // Counter nonces: identical writes still produce distinct blobs.
    assert_ne!(a, b);
    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), b"same bytes".len() + SEALED_OVERHEAD);
}

#[test]
fn test_two_processes_share_derived_keys() {
    // Two vault instances from the same master stand in for two processes.
    let writer = setup_vault();
    let reader = setup_vault();

    let sealed = writer.seal("fleet", b"shared envelope", b"k").unwrap();
    assert_eq!(reader.open("fleet", &sealed, b"k").unwrap(), b"shared envelope");
}
