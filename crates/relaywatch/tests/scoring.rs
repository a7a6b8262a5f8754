use relaywatch::assertion::{build_assertion, AlgorithmMeta, AssertionContext, AssertionStatus};
use relaywatch::countries::{Alliance, CountryIntel};
use relaywatch::nip11::{Limitation, Nip11Info};
use relaywatch::probe::{AccessLevel, ProbeResult, RelayType};
use relaywatch::score::{
    self, latency_percentile_score, score_relay, Confidence, ScoreInputs,
};
use relaywatch::store::{MonitorView, RttSample, TelemetryStats};
use relaywatch::RelayAssertion;
use relaywire::{NormRelayUrl, Pubkey};

fn url(s: &str) -> NormRelayUrl {
    NormRelayUrl::parse(s).unwrap()
}

fn probe(ts: u64, reachable: bool, connect_ms: u64) -> ProbeResult {
    ProbeResult {
        url: url("wss://relay.example.com"),
        timestamp: ts,
        reachable,
        relay_type: RelayType::General,
        access_level: AccessLevel::Open,
        connect_time: reachable.then_some(connect_ms),
        nip11_fetch_time: None,
        read_time: None,
        write_time: None,
        nip11: None,
        closed_reason: None,
        error: None,
    }
}

fn monitor_view(tracked: usize, own_open: u32, own_read: u32, all_open: Vec<u32>) -> MonitorView {
    let all_read: Vec<u32> = all_open.iter().map(|v| v / 2).collect();
    MonitorView {
        monitor: Pubkey::new([3; 32]),
        tracked_relays: tracked,
        latest: Some(RttSample {
            open: Some(own_open),
            read: Some(own_read),
            write: None,
            timestamp: 1700000000,
        }),
        latest_open_all: all_open,
        latest_read_all: all_read,
    }
}

#[test]
fn uptime_three_of_four() {
    let probes = vec![
        probe(0, true, 100),
        probe(60, false, 0),
        probe(120, true, 100),
        probe(180, true, 100),
    ];
    assert_eq!(score::uptime_score(&probes), 75);
}

#[test]
fn uptime_empty_probe_set_is_zero() {
    assert_eq!(score::uptime_score(&[]), 0);
}

#[test]
fn short_outage_recovers_above_ninety() {
    let probes = vec![
        probe(0, true, 100),
        probe(60, false, 0),
        probe(120, true, 100),
        probe(180, true, 100),
    ];
    assert!(score::recovery_score(&probes) > 90);
}

#[test]
fn no_outages_is_perfect_recovery() {
    let probes = vec![probe(0, true, 100), probe(60, true, 100)];
    assert_eq!(score::recovery_score(&probes), 100);
}

#[test]
fn single_probe_recovery_is_neutral() {
    assert_eq!(score::recovery_score(&[probe(0, true, 100)]), 80);
}

#[test]
fn long_outages_collapse_recovery() {
    // one six-hour outage
    let probes = vec![
        probe(0, true, 100),
        probe(60, false, 0),
        probe(21_660, true, 100),
    ];
    assert!(score::recovery_score(&probes) < 50);
}

#[test]
fn consistency_needs_three_samples() {
    let probes = vec![probe(0, true, 100), probe(60, true, 110)];
    assert_eq!(score::consistency_score(&probes), 70);
}

#[test]
fn consistency_is_scale_invariant() {
    let base: Vec<ProbeResult> = [100u64, 110, 120, 130, 200]
        .iter()
        .enumerate()
        .map(|(i, ms)| probe(i as u64 * 60, true, *ms))
        .collect();
    let scaled: Vec<ProbeResult> = [300u64, 330, 360, 390, 600]
        .iter()
        .enumerate()
        .map(|(i, ms)| probe(i as u64 * 60, true, *ms))
        .collect();

    assert_eq!(
        score::consistency_score(&base),
        score::consistency_score(&scaled)
    );
}

#[test]
fn consistency_ignores_unreachable_probes() {
    // an unreachable probe must not contribute latency samples
    let mut probes = vec![
        probe(0, true, 100),
        probe(60, true, 100),
        probe(120, true, 100),
        probe(180, true, 100),
    ];
    let with_failure = {
        let mut p = probes.clone();
        p.push(probe(240, false, 0));
        p
    };
    probes.push(probe(240, true, 100));

    // tight cluster either way
    assert_eq!(
        score::consistency_score(&probes),
        score::consistency_score(&with_failure)
    );
}

#[test]
fn latency_percentile_boundaries() {
    assert_eq!(latency_percentile_score(Some(100), &[]), 50.0);
    assert_eq!(latency_percentile_score(None, &[100, 200, 300]), 50.0);

    let peers = vec![100, 200, 300, 400, 500];
    assert_eq!(latency_percentile_score(Some(100), &peers), 100.0);
    assert_eq!(latency_percentile_score(Some(500), &peers), 0.0);
}

#[test]
fn latency_percentile_is_order_preserving() {
    // relay A strictly faster than B against the same monitor
    let peers = vec![50, 120, 200, 340, 500, 900];
    let a = latency_percentile_score(Some(50), &peers);
    let b = latency_percentile_score(Some(340), &peers);
    assert!(a >= b);
}

#[test]
fn latency_uses_qualifying_monitors_only() {
    // one qualifying monitor where our relay is fastest, one noisy
    // monitor below the 20-relay bar that would rank us last
    let mut all_open: Vec<u32> = (1..=20).map(|i| 100 * i).collect();
    all_open[0] = 10; // our reading
    let qualifying = monitor_view(20, 10, 5, all_open);

    let noisy = monitor_view(3, 900, 800, vec![10, 20, 900]);

    let stats = TelemetryStats {
        event_count: 40,
        monitor_count: 2,
        first_seen: Some(1699000000),
        monitors: vec![qualifying, noisy],
    };
    let score = score::latency_score(&stats, &[]);
    assert!(score > 90, "fastest relay should score high, got {score}");
}

#[test]
fn latency_falls_back_to_tiers_without_qualifying_monitors() {
    let stats = TelemetryStats::default();
    let probes = vec![probe(0, true, 40)];
    assert_eq!(score::latency_score(&stats, &probes), 100);

    let slow = vec![probe(0, true, 900)];
    assert_eq!(score::latency_score(&stats, &slow), 20);

    // nothing at all: neutral
    assert_eq!(score::latency_score(&stats, &[]), 50);
}

#[test]
fn barriers_stack_with_diminishing_returns() {
    let info = Nip11Info {
        limitation: Some(Limitation {
            auth_required: Some(true),
            payment_required: Some(true),
            min_pow_difficulty: Some(20),
            ..Default::default()
        }),
        ..Default::default()
    };
    // 100 - (40*1.0 + 30*0.5 + 15*0.3) = 40.5, rounded half-up
    assert_eq!(score::barriers_score(Some(&info)), 41);
}

#[test]
fn restricted_writes_is_not_a_barrier() {
    let info = Nip11Info {
        limitation: Some(Limitation {
            restricted_writes: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    assert_eq!(score::barriers_score(Some(&info)), 100);
}

#[test]
fn missing_nip11_barrier_and_limit_defaults() {
    assert_eq!(score::barriers_score(None), 70);
    assert_eq!(score::limits_score(None), 80);
}

#[test]
fn tight_limits_deduct() {
    let info = Nip11Info {
        limitation: Some(Limitation {
            max_subscriptions: Some(4),
            max_filters: Some(6),
            max_message_length: Some(16_000),
            ..Default::default()
        }),
        ..Default::default()
    };
    // 100 - 15 (subs<5) - 3 (filters<10) - 3 (message<32000)
    assert_eq!(score::limits_score(Some(&info)), 79);
}

#[test]
fn jurisdiction_bands() {
    let mut intel = CountryIntel::new();
    intel.set_freedom_score("IS", 94);
    intel.set_freedom_score("BR", 65);
    intel.set_freedom_score("CN", 9);

    assert_eq!(score::jurisdiction_score(Some("IS"), &intel), 100);
    // partly free: small penalty
    let br = score::jurisdiction_score(Some("BR"), &intel);
    assert!((90..100).contains(&br));
    // not free: 10..20 penalty
    let cn = score::jurisdiction_score(Some("CN"), &intel);
    assert!((80..=90).contains(&cn));
    // unknown country
    assert_eq!(score::jurisdiction_score(Some("ZZ"), &intel), 75);
    assert_eq!(score::jurisdiction_score(None, &intel), 75);
}

#[test]
fn surveillance_tiers() {
    let mut intel = CountryIntel::new();
    intel.set_alliance("US", Alliance::FiveEyes);
    intel.set_alliance("NL", Alliance::NineEyes);
    intel.set_alliance("DE", Alliance::FourteenEyes);
    intel.set_alliance("BR", Alliance::NonAligned);
    intel.set_alliance("IS", Alliance::PrivacyFriendly);

    assert_eq!(score::surveillance_score(Some("IS"), &intel), 100);
    assert_eq!(score::surveillance_score(Some("BR"), &intel), 90);
    assert_eq!(score::surveillance_score(Some("DE"), &intel), 80);
    assert_eq!(score::surveillance_score(Some("NL"), &intel), 75);
    assert_eq!(score::surveillance_score(Some("US"), &intel), 70);
    assert_eq!(score::surveillance_score(Some("XX"), &intel), 85);
    assert_eq!(score::surveillance_score(None, &intel), 85);
}

#[test]
fn overall_substitutes_reliability_when_down() {
    // published reliability keeps its value, the headline swaps in
    // min(50, uptime)
    let up = score::overall_score(90, 80, 70, true, 60);
    assert_eq!(up, 82); // 0.4*90 + 0.35*80 + 0.25*70 = 81.5

    let down = score::overall_score(90, 80, 70, false, 60);
    assert_eq!(down, 66); // 0.4*50 + 0.35*80 + 0.25*70 = 65.5
}

#[test]
fn all_scores_stay_in_range() {
    let intel = CountryIntel::new();
    let stats = TelemetryStats::default();

    let probe_sets: Vec<Vec<ProbeResult>> = vec![
        vec![],
        vec![probe(0, false, 0)],
        (0..50)
            .map(|i| probe(i * 60, i % 3 != 0, 50 + i * 13))
            .collect(),
    ];

    for probes in &probe_sets {
        let scores = score_relay(
            &ScoreInputs {
                url: &url("wss://relay.example.com"),
                probes,
                stats: &stats,
                nip11: None,
                operator: None,
                jurisdiction: None,
                intel: &intel,
            },
            1700000000,
        );
        for value in [
            scores.overall,
            scores.reliability,
            scores.quality,
            scores.accessibility,
            scores.uptime,
        ] {
            assert!(value <= 100);
        }
    }
}

#[test]
fn assertion_fuses_scores_and_round_trips() {
    let intel = CountryIntel::new();
    let now = 1700000000u64;
    let first = now - 15 * 86_400;

    let probes: Vec<ProbeResult> = (0..50)
        .map(|i| probe(first + i * 600, true, 80 + (i % 7) * 5))
        .collect();

    let stats = TelemetryStats {
        event_count: 100,
        monitor_count: 5,
        first_seen: Some(first),
        monitors: vec![],
    };

    let relay = url("wss://relay.example.com");
    let scores = score_relay(
        &ScoreInputs {
            url: &relay,
            probes: &probes,
            stats: &stats,
            nip11: None,
            operator: None,
            jurisdiction: None,
            intel: &intel,
        },
        now,
    );

    // 50 probes + 100 * 1.5 * 1.5 weighted telemetry
    assert_eq!(scores.weighted_observations, 275.0);
    assert_eq!(scores.confidence, Confidence::Medium);

    let algorithm = AlgorithmMeta::default();
    let assertion = build_assertion(&AssertionContext {
        url: &relay,
        probes: &probes,
        scores: &scores,
        operator: None,
        reports: None,
        jurisdiction: None,
        algorithm: &algorithm,
        now,
    });

    assert_eq!(assertion.status, AssertionStatus::Evaluated);
    assert_eq!(assertion.observations, 275);
    assert_eq!(assertion.observation_period, "15d");
    assert_eq!(assertion.first_seen, first);

    let parsed = RelayAssertion::from_tags(&assertion.to_tags()).unwrap();
    assert_eq!(parsed, assertion);

    let unsigned = assertion.to_unsigned_event(Pubkey::new([1; 32]), now);
    assert_eq!(unsigned.kind, 30385);
    assert_eq!(unsigned.content, "");
}

#[test]
fn unreachable_latest_probe_marks_assertion() {
    let intel = CountryIntel::new();
    let now = 1700000000u64;
    let probes = vec![probe(now - 120, true, 90), probe(now - 60, false, 0)];
    let stats = TelemetryStats::default();
    let relay = url("wss://relay.example.com");

    let scores = score_relay(
        &ScoreInputs {
            url: &relay,
            probes: &probes,
            stats: &stats,
            nip11: None,
            operator: None,
            jurisdiction: None,
            intel: &intel,
        },
        now,
    );
    assert!(!scores.latest_reachable);

    let assertion = build_assertion(&AssertionContext {
        url: &relay,
        probes: &probes,
        scores: &scores,
        operator: None,
        reports: None,
        jurisdiction: None,
        algorithm: &AlgorithmMeta::default(),
        now,
    });
    assert_eq!(assertion.status, AssertionStatus::Unreachable);
}

#[test]
fn url_normalization_is_the_join_key() {
    // the same relay spelled differently lands on one key
    let spellings = [
        "wss://Relay.Example.Com",
        "wss://relay.example.com/",
        "wss://relay.example.com:443",
    ];
    let normalized: Vec<NormRelayUrl> =
        spellings.iter().map(|s| NormRelayUrl::parse(s).unwrap()).collect();
    assert!(normalized.windows(2).all(|w| w[0] == w[1]));
}
