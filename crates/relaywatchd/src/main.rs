use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relaywatch::{
    build_assertion, score_relay, unix_seconds, AlgorithmMeta, Args, AssertionContext, Config,
    CountryIntel, DataStore, GeoResolver, IngestConfig, MemoryDataStore, MonitorIngestor, Prober,
    Publisher, ScoreInputs,
};
use relaywire::{NormRelayUrl, RelayPool};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn setup_logging(debug: bool) {
    let default_filter = if debug {
        "relaywatch=debug,relaywatchd=debug,relaywire=debug"
    } else {
        "relaywatch=info,relaywatchd=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

fn main() {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(&raw_args);
    setup_logging(args.debug);

    let mut config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!("could not load config {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    args.apply(&mut config);

    if config.monitored_relays.is_empty() {
        error!("nothing to monitor; pass -r <relay url> or a config file");
        std::process::exit(1);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        }) {
            warn!("could not install signal handler: {}", err);
        }
    }

    if let Err(err) = run(config, args.force, args.once, shutdown) {
        error!("fatal: {}", err);
        std::process::exit(1);
    }
}

fn run(
    config: Config,
    force: bool,
    once: bool,
    shutdown: Arc<AtomicBool>,
) -> relaywatch::Result<()> {
    let store = Arc::new(MemoryDataStore::new());

    let intel = match &config.country_data_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            CountryIntel::from_json(&raw).unwrap_or_else(|| {
                warn!("country data in {} is unreadable, using empty tables", path);
                CountryIntel::new()
            })
        }
        None => CountryIntel::new(),
    };

    let publisher = match &config.secret_key {
        Some(secret) => Some(Publisher::new(secret, config.publish_threshold)?),
        None => {
            warn!("no secret key configured; measuring without publishing");
            None
        }
    };

    // telemetry ingest runs on its own thread against its own sources
    let ingest_handle = if config.source_relays.is_empty() {
        None
    } else {
        let ingest_config = IngestConfig {
            source_relays: config.source_relays.clone(),
            trusted_monitors: config.trusted_monitor_set(),
            initial_limit: 1000,
        };
        let mut ingestor = MonitorIngestor::new(ingest_config, store.clone());
        let flag = ingestor.shutdown_flag();
        let handle = std::thread::spawn(move || {
            if ingestor.start().is_ok() {
                ingestor.discover_monitors(Duration::from_secs(10));
                ingestor.run();
            }
        });
        Some((handle, flag))
    };

    let mut pool = RelayPool::new();
    pool.publish_timeout = Duration::from_secs(config.publish_timeout_secs);
    for relay in &config.downstream_relays {
        if let Err(err) = pool.add_url(relay, || {}) {
            warn!("skipping downstream relay {}: {}", relay, err);
        }
    }

    let mut urls: Vec<NormRelayUrl> = Vec::new();
    for relay in &config.monitored_relays {
        match NormRelayUrl::parse(relay) {
            Ok(url) => urls.push(url),
            Err(err) => warn!("skipping monitored relay {}: {}", relay, err),
        }
    }
    urls.sort();
    urls.dedup();

    let prober = Prober::new();
    let geo = match &config.geo_endpoint {
        Some(endpoint) => GeoResolver::default().with_endpoint(endpoint.clone()),
        None => GeoResolver::default(),
    };
    let algorithm = AlgorithmMeta::default();
    let window = Duration::from_secs(config.probe_window_secs);
    let interval = Duration::from_secs(config.probe_interval_secs);

    info!(
        relays = urls.len(),
        downstream = config.downstream_relays.len(),
        sources = config.source_relays.len(),
        "relaywatch starting"
    );

    loop {
        let round_started = Instant::now();
        let mut assertions = Vec::with_capacity(urls.len());

        for url in &urls {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let probe = prober.probe(url);
            info!(
                relay = %url,
                reachable = probe.reachable,
                connect_ms = ?probe.connect_time,
                read_ms = ?probe.read_time,
                "probe complete"
            );
            store.store_probe(probe)?;

            let now = unix_seconds();
            let probes = store.get_probes(url, window, now)?;
            let stats = store.get_telemetry_stats(url)?;
            let jurisdiction = match geo.resolve(url) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!("jurisdiction lookup for {} failed: {}", url, err);
                    None
                }
            };
            let nip11 = probes.iter().rev().find_map(|p| p.nip11.clone());

            let scores = score_relay(
                &ScoreInputs {
                    url,
                    probes: &probes,
                    stats: &stats,
                    nip11: nip11.as_ref(),
                    operator: None,
                    jurisdiction: jurisdiction.as_ref(),
                    intel: &intel,
                },
                now,
            );

            assertions.push(build_assertion(&AssertionContext {
                url,
                probes: &probes,
                scores: &scores,
                operator: None,
                reports: None,
                jurisdiction: jurisdiction.as_ref(),
                algorithm: &algorithm,
                now,
            }));
        }

        if let Some(publisher) = &publisher {
            let reports = publisher.publish_batch(&mut pool, store.as_ref(), &assertions, force);
            let published = reports.iter().filter(|r| r.success).count();
            let skipped = reports.iter().filter(|r| r.skipped.is_some()).count();
            info!(
                published,
                skipped,
                total = reports.len(),
                "publish round complete"
            );
        }

        if once || shutdown.load(Ordering::Relaxed) {
            break;
        }

        // idle out the rest of the interval, keeping the pool alive
        while round_started.elapsed() < interval && !shutdown.load(Ordering::Relaxed) {
            pool.tick(|| {});
            while pool.try_recv().is_some() {}
            std::thread::sleep(Duration::from_millis(200));
        }

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    if let Some((handle, flag)) = ingest_handle {
        flag.store(true, Ordering::Relaxed);
        if handle.join().is_err() {
            warn!("ingest thread panicked during shutdown");
        }
    }

    info!("shutdown complete");
    Ok(())
}
