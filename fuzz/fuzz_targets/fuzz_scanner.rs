// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use agent_wall::config::ResponseScanningConfig;
use agent_wall::security::scanner::ResponseScanner;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let scanner = ResponseScanner::new(&ResponseScanningConfig {
        detect_pii: true,
        max_response_size: 4 * 1024,
        ..ResponseScanningConfig::default()
    });
    let result = scanner.scan(text);
    if let Some(redacted) = result.redacted_text {
        // Redaction must terminate and produce valid UTF-8 output.
        let _ = redacted.len();
    }
});
