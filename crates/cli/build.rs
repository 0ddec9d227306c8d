//! Stamps the binary with the commit it was built from, shown in the run
//! banner and recorded in `export` dumps.

use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn main() {
    let build = git(&["describe", "--always", "--dirty=+"]).unwrap_or_else(|| "nogit".to_string());
    println!("cargo:rustc-env=CONFLUENCE_BUILD={build}");

    for watched in ["HEAD", "index"] {
        println!("cargo:rerun-if-changed=../../.git/{watched}");
    }
}
