//! Benchmarks for envelope encryption and Access Object tagging.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use keyward_core::{
    AccessObject, Cryptor, MacDomain, MessageAuthenticator, ObjectId, SymmetricKey, UserId,
};

fn bench_cryptor(c: &mut Criterion) {
    let cryptor = Cryptor::new(&SymmetricKey::generate());
    let aad = b"bench-aad";

    let mut group = c.benchmark_group("cryptor");
    for size in [64usize, 1024, 64 * 1024] {
        let plaintext = vec![0x5a; size];
        let (wrapped, ciphertext) = cryptor.encrypt(&plaintext, aad).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encrypt", size), &plaintext, |b, pt| {
            b.iter(|| cryptor.encrypt(black_box(pt), aad).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &ciphertext, |b, ct| {
            b.iter(|| cryptor.decrypt(&wrapped, black_box(ct), aad).unwrap())
        });
    }
    group.finish();
}

fn bench_access_object(c: &mut Criterion) {
    let mac = MessageAuthenticator::new(&SymmetricKey::generate(), MacDomain::AccessObjects);
    let object_id = ObjectId::generate();
    let cryptor = Cryptor::new(&SymmetricKey::generate());
    let (wrapped, _) = cryptor.encrypt(b"", b"").unwrap();

    let mut group = c.benchmark_group("access_object");
    for members in [1usize, 16, 256] {
        let mut ao = AccessObject::new(UserId::generate(), wrapped.clone());
        for _ in 1..members {
            ao.add_user(UserId::generate());
        }
        let bytes = ao.to_bytes().unwrap();
        let tag = mac.tag(object_id.as_bytes(), &bytes);

        group.bench_with_input(BenchmarkId::new("encode_and_tag", members), &ao, |b, ao| {
            b.iter(|| {
                let bytes = ao.to_bytes().unwrap();
                mac.tag(object_id.as_bytes(), black_box(&bytes))
            })
        });
        group.bench_with_input(BenchmarkId::new("verify_and_decode", members), &bytes, |b, bytes| {
            b.iter(|| {
                assert!(mac.verify(object_id.as_bytes(), black_box(bytes), tag.as_bytes()));
                AccessObject::from_bytes(bytes).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cryptor, bench_access_object);
criterion_main!(benches);
