use std::hint::black_box;
use std::time::Instant;

use custody_envelope::{derive_hex, open, seal};

fn time_it<F: FnMut()>(label: &str, iters: usize, mut f: F) {
    // warmup
    for _ in 0..(iters / 10).max(10) {
        f();
    }

    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    let elapsed = start.elapsed();

    let per_iter = elapsed / (iters as u32);
    println!("{:<16} total={:?}  per_iter={:?}", label, elapsed, per_iter);
}

fn main() {
    let key = derive_hex("deadbeef").unwrap();
    let wrong_key = derive_hex("00000000").unwrap();

    let plaintext = vec![0x42u8; 1024];
    let env = seal(&plaintext, &key).unwrap();

    let mut env_tampered = env.clone();
    let last = env_tampered.len() - 1;
    env_tampered[last] ^= 0x01;

    let mut env_bad_tag = env.clone();
    env_bad_tag[16] ^= 0x01;

    let iters = 5_000;

    time_it("valid", iters, || {
        let pt = open(black_box(&env), black_box(&key)).unwrap();
        black_box(pt);
    });

    time_it("wrong_key", iters, || {
        let r = open(black_box(&env), black_box(&wrong_key));
        black_box(r.err());
    });

    time_it("tampered_ct", iters, || {
        let r = open(black_box(&env_tampered), black_box(&key));
        black_box(r.err());
    });

    time_it("tampered_tag", iters, || {
        let r = open(black_box(&env_bad_tag), black_box(&key));
        black_box(r.err());
    });

    time_it("short", iters, || {
        let r = open(black_box(b"short"), black_box(&key));
        black_box(r.err());
    });

    println!("\nDone.");
}
