use std::io;
use std::process::{Command, Stdio};

fn git_output(args: &[&str]) -> Result<String, io::Error> {
    let cmd = Command::new("git")
        .args(args)
        .stderr(Stdio::inherit())
        .output()?;

    if !cmd.status.success() {
        return Err(io::Error::other(format!(
            "`git {}` failed: {}",
            args.join(" "),
            cmd.status
        )));
    }

    Ok(String::from_utf8_lossy(&cmd.stdout).trim().to_owned())
}

fn emit_var(name: &str, args: &[&str]) {
    // builds outside of a git checkout fall back to the package version
    let value = git_output(args).unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_owned());

    println!("cargo:rustc-env={name}={value}");
    println!("cargo:rerun-if-env-changed={name}");
}

fn main() {
    emit_var("WEATHERCACHE_GIT_VERSION", &["describe", "--always", "--dirty=-modified"]);
    emit_var("WEATHERCACHE_RELEASE", &["rev-parse", "HEAD"]);
}
