//! End-to-end properties of the svndiff codec.

use subdav_delta::svndiff::apply::apply_delta;
use subdav_delta::svndiff::read::{decode, SvndiffDecoder};
use subdav_delta::svndiff::write::{delta_windows, encode};
use subdav_delta::window::{DeltaWindow, Instruction};
use subdav_delta::DeltaError;
use subdav_types::Md5;

fn sample_pairs() -> Vec<(Vec<u8>, Vec<u8>)> {
    let window = 100 * 1024;
    vec![
        (Vec::new(), Vec::new()),
        (Vec::new(), b"hello\n".to_vec()),
        (b"hello\n".to_vec(), Vec::new()),
        (b"hello\n".to_vec(), b"hello world\n".to_vec()),
        (b"abcdef".repeat(1000), b"abcdef".repeat(1000)),
        // exactly one window boundary
        (vec![3u8; window], vec![3u8; window]),
        // spans several windows with a mid-stream edit
        (vec![5u8; 3 * window + 11], {
            let mut t = vec![5u8; 3 * window + 11];
            t[window + 1] = 9;
            t
        }),
    ]
}

#[test]
fn encode_then_apply_is_identity() {
    for (source, target) in sample_pairs() {
        let windows = delta_windows(&source, &target);
        let wire = encode(&windows).unwrap();
        let parsed = decode(&wire).unwrap();
        let result = apply_delta(&source, &parsed, Some(Md5::digest(&target))).unwrap();
        assert_eq!(result, target);
    }
}

#[test]
fn window_split_is_application_invariant() {
    // Any partition of the target into ordered windows must reproduce it.
    let target = b"0123456789".repeat(50);
    for chunk in [1usize, 3, 7, 64, 499] {
        let windows: Vec<DeltaWindow> = target
            .chunks(chunk)
            .map(|c| DeltaWindow {
                source_offset: 0,
                source_len: 0,
                target_len: c.len(),
                instructions: vec![Instruction::NewData { len: c.len() }],
                new_data: c.to_vec(),
            })
            .collect();
        let out = apply_delta(&[], &windows, None).unwrap();
        assert_eq!(out, target);
    }
}

#[test]
fn chunked_decode_matches_oneshot() {
    let (source, target) = (b"base text".repeat(9000), b"base text!".repeat(9000));
    let wire = encode(&delta_windows(&source, &target)).unwrap();
    let oneshot = decode(&wire).unwrap();

    for chunk in [1usize, 2, 13, 1024] {
        let mut decoder = SvndiffDecoder::new();
        let mut windows = Vec::new();
        for piece in wire.chunks(chunk) {
            windows.extend(decoder.push(piece).unwrap());
        }
        decoder.finish().unwrap();
        assert_eq!(windows, oneshot);
    }
}

#[test]
fn self_referencing_encoding_of_ababab() {
    // "ababab" as one window: new-data "ab" then target-copy (0, 4).
    let window = DeltaWindow {
        source_offset: 0,
        source_len: 0,
        target_len: 6,
        instructions: vec![
            Instruction::NewData { len: 2 },
            Instruction::TargetCopy { offset: 0, len: 4 },
        ],
        new_data: b"ab".to_vec(),
    };
    let wire = encode(std::slice::from_ref(&window)).unwrap();
    let parsed = decode(&wire).unwrap();
    let out = apply_delta(&[], &parsed, Some(Md5::digest(b"ababab"))).unwrap();
    assert_eq!(out, b"ababab");
}

#[test]
fn malformed_streams_never_silently_succeed() {
    let good = encode(&delta_windows(b"aaa", b"aaabbb")).unwrap();

    // flip the magic
    let mut bad = good.clone();
    bad[0] = b'X';
    assert!(decode(&bad).is_err());

    // declare a bigger target view than the instructions produce
    let mut bad = good.clone();
    // byte layout: S V N 0, then source-offset(0) source-len(3) target-len(6)
    assert_eq!(bad[6], 6);
    bad[6] = 7;
    assert!(matches!(
        decode(&bad),
        Err(DeltaError::MalformedSvndiff(_))
    ));

    // truncate mid-window
    let mut decoder = SvndiffDecoder::new();
    decoder.push(&good[..good.len() - 1]).unwrap();
    assert!(matches!(decoder.finish(), Err(DeltaError::UnexpectedEof)));
}
