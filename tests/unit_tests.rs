// Tests for the public component APIs, no network involved

#[cfg(test)]
mod registry_tests {
    use futures_util::future::join_all;
    use std::sync::Arc;
    use tchat_relay::core::connection::Connection;
    use tchat_relay::core::session::{create_registry, Session};

    fn connection(port: u16) -> Arc<Connection> {
        let addr = format!("127.0.0.1:{}", port).parse().unwrap();
        Connection::spawn(tokio::io::sink(), addr)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_names_all_admitted() {
        let registry = create_registry();

        let admissions = (0..100u16).map(|i| {
            let registry = registry.clone();
            async move {
                registry
                    .admit(Session::new(connection(10000 + i), format!("user{:03}", i)))
                    .await
            }
        });

        let results = join_all(admissions).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(registry.count().await, 100);
        assert_eq!(registry.snapshot().await.len(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_name_exactly_one_wins() {
        let registry = create_registry();

        let handles: Vec<_> = (0..16u16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .admit(Session::new(connection(20000 + i), "alice"))
                        .await
                })
            })
            .collect();

        let admitted = join_all(handles)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(()))))
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(registry.count().await, 1);
    }
}

#[cfg(test)]
mod history_tests {
    use tchat_relay::core::message::Frame;
    use tchat_relay::storage::message_store::HistoryBuffer;

    #[test]
    fn test_keeps_last_ten_in_order() {
        let mut history = HistoryBuffer::with_capacity(10);
        for i in 0..15 {
            history.push(Frame::chat("alice", &format!("m{}", i), None));
        }

        let messages: Vec<String> = history.snapshot().into_iter().map(|f| f.message).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("m{}", i)).collect();
        assert_eq!(messages, expected);
    }
}

#[cfg(test)]
mod moderation_tests {
    use std::net::IpAddr;
    use tchat_relay::core::message::Frame;
    use tchat_relay::core::moderation::{BanTable, MuteList};

    #[test]
    fn test_mute_list() {
        let mut mutes = MuteList::new();

        // Unmuting a name that was never muted is a no-op
        assert!(!mutes.unmute("bob"));

        assert!(mutes.mute("bob"));
        assert!(!mutes.should_display(&Frame::chat("bob", "spam", None)));
        assert!(mutes.should_display(&Frame::chat("carol", "hi", None)));
        assert!(mutes.should_display(&Frame::notice("bob has left the chat")));

        assert!(mutes.unmute("bob"));
        assert!(mutes.should_display(&Frame::chat("bob", "sorry", None)));
    }

    #[tokio::test]
    async fn test_double_ban_is_a_no_op() {
        let bans = BanTable::new();
        let ip: IpAddr = "192.168.1.20".parse().unwrap();

        assert!(bans.ban(ip).await);
        assert!(!bans.ban(ip).await);
        assert_eq!(bans.banned().await, vec![ip]);
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use std::time::{Duration, Instant};
    use tchat_relay::core::rate_limiter::MessageRateLimiter;

    #[test]
    fn test_default_window() {
        let mut limiter = MessageRateLimiter::default();
        let start = Instant::now();

        for _ in 0..10 {
            assert!(limiter.allow_message_at(start));
        }
        assert!(!limiter.allow_message_at(start + Duration::from_secs(2)));
        assert!(limiter.allow_message_at(start + Duration::from_secs(6)));
    }
}
