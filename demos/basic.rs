/// Basic example: open an archive, list it and run its entry module
///
/// Run with: cargo run --example basic [path/to/app.asar]
///
/// Without an argument a small archive is laid out in memory.
use asar_rs::{from_fn, Evaluation, Filesystem, ListOptions, ModuleRegistry};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== asar-rs Basic Example ===\n");

    let fs = match std::env::args().nth(1) {
        Some(path) => Filesystem::open(path)?,
        None => Filesystem::new(sample_archive())?,
    };

    println!("1. Listing archive...");
    let options = ListOptions {
        annotate_unpacked: true,
        ..ListOptions::default()
    };
    for path in fs.list_files(options) {
        println!("   {}", path);
    }

    println!("\n2. Running entry module...");
    let registry = ModuleRegistry::new(Arc::new(fs));
    // No script engine here: a script exports its own size and first line
    registry.register_extension(
        ".js",
        from_fn(|cx: Evaluation<'_>| {
            let text = String::from_utf8_lossy(cx.source);
            cx.exports.insert("bytes", json!(cx.source.len()));
            cx.exports.insert("firstLine", json!(text.lines().next()));
            Ok(())
        }),
    );
    let exports = registry.run_main()?;
    println!("   main: {}", registry.main().unwrap_or_default());
    println!("   exports: {}", exports.get());

    println!("\n✓ Example complete!");
    Ok(())
}

/// `package.json` pointing at `lib/app.js`, laid out as an asar archive
fn sample_archive() -> Vec<u8> {
    let package = br#"{"name":"demo","main":"lib/app.js"}"#;
    let app = b"// demo entry\nmodule.exports = 42;\n";
    let header = json!({
        "files": {
            "package.json": { "size": package.len(), "offset": "0" },
            "lib": { "files": {
                "app.js": { "size": app.len(), "offset": package.len().to_string() }
            } }
        }
    })
    .to_string();

    let header_payload = 4 + (header.len() + 3) / 4 * 4;
    let mut buf = Vec::new();
    buf.extend_from_slice(&4u32.to_le_bytes());
    buf.extend_from_slice(&(header_payload as u32 + 4).to_le_bytes());
    buf.extend_from_slice(&(header_payload as u32).to_le_bytes());
    buf.extend_from_slice(&(header.len() as i32).to_le_bytes());
    buf.extend_from_slice(header.as_bytes());
    buf.resize(12 + header_payload, 0);
    buf.extend_from_slice(package);
    buf.extend_from_slice(app);
    buf
}
