use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

// Copies the `memory.x` file from the crate root into a directory where
// the linker can always find it at build time.
fn memory(out: &Path) -> Result<()> {
    File::create(out.join("memory.x"))
        .and_then(|mut f| f.write_all(include_bytes!("memory.x")))
        .context("Saving memory.x")?;

    // Ensure it's on the linker search path.
    println!("cargo:rustc-link-search={}", out.display());

    // By default, Cargo will re-run a build script whenever
    // any file in the project changes. By specifying `memory.x`
    // here, we ensure the build script is only re-run when
    // `memory.x` is changed.
    println!("cargo:rerun-if-changed=memory.x");

    Ok(())
}

// Per-board GPIO override for the PIO USB host port (D+ pin; D- is D+ + 1).
// Boards wire the second USB port differently, so the pin is a build-time
// option rather than a config field.
fn board_pins(out: &Path) -> Result<()> {
    println!("cargo:rerun-if-env-changed=PADBRIDGE_PIO_USB_DP");
    let dp: u8 = match env::var("PADBRIDGE_PIO_USB_DP") {
        Ok(v) => v
            .parse()
            .context("PADBRIDGE_PIO_USB_DP must be a GPIO number")?,
        Err(_) => 16,
    };
    anyhow::ensure!(dp < 29, "PIO USB D+ must be GPIO0..GPIO28, got {}", dp);

    let mut f = File::create(out.join("board_pins.rs")).context("Creating board_pins.rs")?;
    writeln!(f, "/// GPIO number of the PIO USB host D+ line (D- is the next GPIO).")?;
    writeln!(f, "pub const PIO_USB_DP_PIN: u8 = {};", dp)?;
    Ok(())
}

fn main() -> Result<()> {
    let out = &PathBuf::from(env::var_os("OUT_DIR").context("Could not get OUT_DIR")?);
    memory(out)?;
    board_pins(out)?;
    Ok(())
}
