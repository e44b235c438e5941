//! Throughput of the core pipeline pieces.
//!
//! Run with: `cargo bench --bench pipeline`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use custody_envelope::{
    derive, delegate, issue_root, open, seal, verify, Command, Constraints, FixedClock, Keypair,
    Secret, Token,
};

/// Payload sizes to benchmark.
const PAYLOAD_SIZES: &[usize] = &[64, 1024, 65_536, 1_048_576];

fn bench_envelope(c: &mut Criterion) {
    let key = derive(&Secret::generate()).unwrap();
    let mut group = c.benchmark_group("envelope");

    for &size in PAYLOAD_SIZES {
        let plaintext = vec![0x42u8; size];
        let env = seal(&plaintext, &key).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("seal", size), &plaintext, |b, pt| {
            b.iter(|| seal(pt, &key).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("open", size), &env, |b, env| {
            b.iter(|| open(env, &key).unwrap())
        });
    }
    group.finish();
}

fn bench_tokens(c: &mut Criterion) {
    let clock = FixedClock::new(1_700_000_000);
    let builder = Keypair::generate();
    let user = Keypair::generate();
    let root = issue_root(&builder, Command::parse("/nil/db/data").unwrap(), 7200, &clock).unwrap();
    let create = Command::parse("/nil/db/data/create").unwrap();
    let leaf = delegate(&root, create.clone(), &user.did(), 3600, &builder, &clock, Constraints::new()).unwrap();
    let trusted = [builder.did()];
    let encoded = leaf.encode();

    c.bench_function("token/delegate", |b| {
        b.iter(|| {
            delegate(&root, create.clone(), &user.did(), 3600, &builder, &clock, Constraints::new()).unwrap()
        })
    });
    c.bench_function("token/verify", |b| {
        b.iter(|| verify(&leaf, &trusted, 1_700_000_001).unwrap())
    });
    c.bench_function("token/decode_verify", |b| {
        b.iter(|| {
            let t = Token::decode(&encoded).unwrap();
            verify(&t, &trusted, 1_700_000_001).unwrap()
        })
    });
}

criterion_group!(benches, bench_envelope, bench_tokens);
criterion_main!(benches);
