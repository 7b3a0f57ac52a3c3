// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use agent_wall::mcp::codec::FrameParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // No byte sequence, however sliced, may panic the parser. Correctness is
    // covered by unit tests; this guards against crashes only.
    let mut parser = FrameParser::with_limit(64 * 1024);
    for chunk in data.chunks(7) {
        let _ = parser.append(chunk);
        loop {
            match parser.read_message() {
                Ok(Some(_)) | Err(_) => {}
                Ok(None) => break,
            }
        }
    }
});
