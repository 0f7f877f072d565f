//! # Integration Tests
//!
//! Cross-crate and end-to-end tests.
//!
//! Covers:
//! - Config file -> ticker -> subscribers
//! - Timer accuracy across subscribers
//! - Multi-producer ordering and concurrent registry churn

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{EventPacket, FailurePolicy, TickerConfig};
    use serde_json::json;

    /// A ticker config survives TOML write/read and shapes the same packets
    #[test]
    fn test_ticker_config_round_trips_into_packet_template() {
        let mut config = TickerConfig::new(1.0);
        config.failure_policy = FailurePolicy::FailFast;
        config.template.insert("source".to_string(), json!("unit"));
        config.template.insert("cookie".to_string(), json!({ "k": 1 }));

        let toml = ConfigLoader::to_toml(&config).unwrap();
        let loaded: TickerConfig = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        assert_eq!(loaded.event_name(), "1.0sRepeatingTimer");
        assert_eq!(loaded.failure_policy, FailurePolicy::FailFast);
        assert_eq!(loaded.template, config.template);

        let template = EventPacket::template(loaded.event_name(), &loaded.template);
        assert_eq!(template.cookie, Some(json!({ "k": 1 })));
        assert_eq!(template.field("source"), Some(&json!("unit")));

        let addressed = template.addressed_to("timer1", None);
        let wire = serde_json::to_string(&addressed).unwrap();
        let decoded: EventPacket = serde_json::from_str(&wire).unwrap();
        assert_eq!(decoded, addressed);
        assert_eq!(decoded.dest.as_deref(), Some("timer1"));
        assert_eq!(decoded.cookie, None);
    }
}

#[cfg(test)]
mod timer_tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use dispatcher::callback;
    use ticker::PeriodicTicker;

    /// Two subscribers of a 1s ticker fire together near the 1s mark
    #[test]
    fn test_timer_fires_all_subscribers_on_interval() {
        let fired: Arc<Mutex<Vec<(String, Instant)>>> = Arc::new(Mutex::new(Vec::new()));
        let ticker = PeriodicTicker::builder(1.0)
            .name("test_timer")
            .build()
            .unwrap();
        let then = Instant::now();

        for name in ["timer1", "timer2"] {
            let fired = Arc::clone(&fired);
            ticker.subscribe(
                name,
                callback(move |packet| {
                    let dest = packet.dest.clone().unwrap_or_default();
                    fired.lock().unwrap().push((dest, Instant::now()));
                }),
                None,
            );
        }

        let deadline = then + Duration::from_secs(4);
        while fired.lock().unwrap().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        ticker.stop();

        let fired = fired.lock().unwrap();
        assert!(fired.len() >= 2, "only {} deliveries", fired.len());
        let (first_name, first_at) = &fired[0];
        let (second_name, second_at) = &fired[1];
        assert_eq!(first_name, "timer1");
        assert_eq!(second_name, "timer2");

        let first_offset = first_at.duration_since(then).as_secs_f64();
        assert!(
            (0.9..=1.5).contains(&first_offset),
            "first tick at {first_offset}s"
        );
        assert!(second_at.duration_since(*first_at) < Duration::from_millis(100));
    }

    #[test]
    fn test_ticker_stop_reports_not_running() {
        let ticker = PeriodicTicker::new(1.0).unwrap();
        ticker.stop();
        assert!(!ticker.is_running());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use config_loader::ConfigLoader;
    use dispatcher::{callback, Dispatcher, EventPacket};
    use serde_json::json;
    use ticker::PeriodicTicker;

    /// Config file -> PeriodicTicker -> relay subscriber -> second Dispatcher
    #[test]
    fn test_config_driven_ticker_relays_into_dispatcher() {
        let mut file = tempfile_with(
            ".toml",
            r#"
interval_secs = 0.05
name = "heartbeat"

[template]
origin = "e2e"
"#,
        );
        file.flush().unwrap();

        let config = ConfigLoader::load_ticker(file.path()).unwrap();
        let ticker = PeriodicTicker::from_config(&config).unwrap();

        let downstream = Arc::new(Dispatcher::new("relayed").unwrap());
        let (tx, rx) = mpsc::channel::<EventPacket>();
        downstream.subscribe(
            "sink",
            callback(move |packet| {
                let _ = tx.send(packet.clone());
            }),
            None,
        );

        let relay_target = Arc::clone(&downstream);
        ticker.subscribe(
            "relay",
            callback(move |packet| {
                let _ = relay_target.post(json!({
                    "from": packet.event,
                    "at": packet.payload,
                    "origin": packet.field("origin"),
                }));
            }),
            None,
        );

        let mut stamps = Vec::new();
        for _ in 0..3 {
            let packet = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(packet.event, "relayed");
            assert_eq!(packet.payload["from"], "heartbeat");
            assert_eq!(packet.payload["origin"], "e2e");
            stamps.push(packet.payload["at"].as_f64().unwrap());
        }
        ticker.stop();
        downstream.stop();

        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    /// Each producer's posts arrive in that producer's order
    #[test]
    fn test_multi_producer_per_thread_order() {
        let dispatcher = Arc::new(Dispatcher::new("mp").unwrap());
        let (tx, rx) = mpsc::channel();
        dispatcher.subscribe(
            "collector",
            callback(move |packet| {
                let _ = tx.send(packet.payload.clone());
            }),
            None,
        );

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    for i in 0..100 {
                        dispatcher.post(json!({ "p": p, "i": i })).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut last = [-1i64; 4];
        for _ in 0..400 {
            let payload = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            let p = payload["p"].as_u64().unwrap() as usize;
            let i = payload["i"].as_i64().unwrap();
            assert!(i > last[p], "producer {p} out of order");
            last[p] = i;
        }
        assert_eq!(dispatcher.metrics().posted, 400);
    }

    /// Registry churn from other threads while packets flow never deadlocks
    #[test]
    fn test_concurrent_subscribe_unsubscribe_during_delivery() {
        let dispatcher = Arc::new(Dispatcher::new("churn").unwrap());
        let delivered = Arc::new(AtomicU64::new(0));

        let stable_count = Arc::clone(&delivered);
        dispatcher.subscribe(
            "stable",
            callback(move |_| {
                stable_count.fetch_add(1, Ordering::SeqCst);
            }),
            None,
        );

        let churner = {
            let dispatcher = Arc::clone(&dispatcher);
            thread::spawn(move || {
                for i in 0..200 {
                    let name = format!("transient-{}", i % 5);
                    dispatcher.subscribe(name.clone(), callback(|_| {}), None);
                    dispatcher.unsubscribe(&name);
                }
            })
        };

        for i in 0..200 {
            dispatcher.post(i).unwrap();
        }
        churner.join().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while delivered.load(Ordering::SeqCst) < 200 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(delivered.load(Ordering::SeqCst), 200);
        dispatcher.stop();
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    fn tempfile_with(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }
}
