#![no_main]

use asar_rs::{Filesystem, ListOptions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Size pickle plus the header pickle's own prefixes
    if data.len() < 16 {
        return;
    }

    // Decoding should never panic
    let fs = match Filesystem::new(data) {
        Ok(fs) => fs,
        Err(_) => return, // Expected for invalid data
    };

    // Every listed path should be readable or fail cleanly
    for path in fs.list_files(ListOptions::default()) {
        let _ = fs.stat(&path);
        let _ = fs.lstat(&path);
        let _ = fs.read_file(&path);
        let _ = fs.read_dir(&path);
        let _ = fs.verify_integrity(&path);
    }

    // Lookups with odd paths should never panic
    let _ = fs.exists("");
    let _ = fs.exists("/");
    let _ = fs.exists("../../../etc/passwd");
    let _ = fs.read_dir("/./a/../");
});
