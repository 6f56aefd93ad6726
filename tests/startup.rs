use std::process::Command;

#[test]
fn fails_with_unsupported_secret_store() {
    let exe = env!("CARGO_BIN_EXE_authgate");
    let output = Command::new(exe)
        .env("KEY_SECRET_STORE", "vault")
        .output()
        .expect("failed to run authgate binary");
    assert!(!output.status.success());
}
