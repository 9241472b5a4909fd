//! # Wallet Benchmarks
//!
//! Hot paths that run on every dapp interaction:
//!
//! | Path | Runs on |
//! |------|---------|
//! | WalletConnect URI parse | every pairing link |
//! | deep link origin classification | every SDK link |
//! | personal_sign digest + sign + recover | every signature request |
//! | fiat balance aggregation | every wallet overview render |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use dapp_bridge::deeplink::classify_origin;
use dapp_bridge::walletconnect::WalletConnectUri;
use shared_crypto::{personal_message_hash, recover_address, EthKeyPair};
use wallet_engine::engine::total_fiat_balance;
use wallet_engine::EngineState;

// ============================================================================
// Link handling
// ============================================================================

fn bench_link_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("links");

    let v2 = "wc:7f6e504bfad60b485450578e05678ed3e8e8c4751d3c6160be17160d63ec90f9@2?relay-protocol=irn&symKey=587d5484ce2a2a6ee3ba1962fdd7e8588e06200c46823bd18fbd67def96ad303";
    group.bench_function("walletconnect_uri_v2", |b| {
        b.iter(|| black_box(WalletConnectUri::parse(black_box(v2)).is_ok()))
    });

    let link = "https://metamask.app.link/connect?channelId=0b7c6f7a&comm=socket&pubkey=02ab&t=q";
    group.bench_function("classify_deeplink_origin", |b| {
        b.iter(|| black_box(classify_origin(black_box("deeplink"), black_box(link))))
    });

    group.finish();
}

// ============================================================================
// Signing
// ============================================================================

fn bench_personal_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("personal_sign");
    let pair = EthKeyPair::generate();

    for size in [32usize, 256, 4096] {
        let message = vec![0x42u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sign_and_recover", size), &message, |b, message| {
            b.iter(|| {
                let digest = personal_message_hash(message);
                let signature = pair.sign_hash(&digest).unwrap();
                black_box(recover_address(&digest, &signature).unwrap())
            })
        });
    }

    group.finish();
}

// ============================================================================
// Balances
// ============================================================================

fn bench_fiat_balance(c: &mut Criterion) {
    let state = EngineState::default();
    c.bench_function("total_fiat_balance_empty", |b| {
        b.iter(|| black_box(total_fiat_balance(black_box(&state)).ok()))
    });
}

criterion_group!(benches, bench_link_parsing, bench_personal_sign, bench_fiat_balance);
criterion_main!(benches);
