//! Orchestrator Module Tests
//!
//! ## Test Scopes
//! - **Splitting**: Part sizes, sentence alignment and re-merging.
//! - **Routing & Fallback**: Validation, single-thread mode, local processing and degradation on silent workers (paused clock).
//! - **Merging**: Short merges, partial failures and the batch deadline.
//! - **Result Routing**: Orphans and completion notices.
//! - **End to End**: A coordinator and real workers on loopback UDP.

#[cfg(test)]
mod tests {
    use crate::config::{MasterConfig, OrchestratorConfig, TransportConfig, WorkerConfig};
    use crate::error::ClusterError;
    use crate::membership::service::WorkerRegistry;
    use crate::membership::types::WorkerId;
    use crate::orchestrator::distributor::TaskDistributor;
    use crate::orchestrator::master::MasterNode;
    use crate::orchestrator::splitter::split_for_distribution;
    use crate::orchestrator::types::{DistributedTask, ProcessingMode, SubTask};
    use crate::summarizer::{Summarizer, TextRankSummarizer};
    use crate::transport::pending::PendingTasks;
    use crate::transport::sender::TaskSender;
    use crate::transport::types::{TaskId, TaskReport};
    use crate::transport::wire::WireMessage;
    use crate::worker::node::SlaveNode;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tokio::time::Instant;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn corpus(min_chars: usize) -> String {
        let topics = [
            "storage", "network", "compiler", "scheduler", "memory", "database", "protocol",
        ];
        let mut text = String::new();
        let mut i = 0;
        while text.len() < min_chars {
            let a = topics[i % topics.len()];
            let b = topics[(i * 3 + 1) % topics.len()];
            text.push_str(&format!(
                "The {a} layer number {i} cooperates with the {b} subsystem during recovery. "
            ));
            i += 1;
        }
        text
    }

    async fn distributor_with(registry: Arc<WorkerRegistry>) -> Arc<TaskDistributor> {
        distributor_configured(registry, TransportConfig::default(), OrchestratorConfig::default())
            .await
    }

    async fn distributor_configured(
        registry: Arc<WorkerRegistry>,
        transport: TransportConfig,
        orchestrator: OrchestratorConfig,
    ) -> Arc<TaskDistributor> {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = TaskSender::new(
            Arc::new(socket),
            registry,
            Arc::new(PendingTasks::new()),
            transport,
            6001,
        );
        Arc::new(TaskDistributor::new(
            sender,
            Arc::new(TextRankSummarizer::new()),
            orchestrator,
        ))
    }

    /// A worker that answers every task it receives by feeding the reply
    /// straight into the distributor, followed by its completion notice.
    async fn answering_worker(
        registry: &WorkerRegistry,
        distributor: Arc<TaskDistributor>,
        id: &'static str,
        reply: fn(&TaskId) -> String,
    ) {
        let socket = silent_worker(registry, id).await;
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_536];
            loop {
                let Ok((len, _)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if let Ok(WireMessage::Task(task)) = WireMessage::decode(&buf[..len]) {
                    distributor.resolve_result(TaskReport::success(
                        task.task_id.clone(),
                        reply(&task.task_id),
                        task.file_name.clone(),
                    ));
                    distributor.resolve_completion_notice(&WorkerId::from(id), &task.task_id);
                }
            }
        });
    }

    async fn silent_worker(registry: &WorkerRegistry, id: &str) -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        registry.register_or_refresh(WorkerId::from(id), LOCALHOST, port);
        socket
    }

    // ============================================================
    // SPLITTER TESTS
    // ============================================================

    #[test]
    fn test_short_text_is_a_single_part() {
        let parts = split_for_distribution("One. Two.", 15_000, 10, 1.5);
        assert_eq!(parts, vec!["One. Two."]);
    }

    #[test]
    fn test_45k_chars_split_into_three_parts() {
        // ARRANGE
        let sentence = format!("{}. ", "a".repeat(98));
        let text = sentence.repeat(450);
        assert_eq!(text.len(), 45_000);

        // ACT
        let parts = split_for_distribution(&text, 15_000, 10, 1.5);

        // ASSERT
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 15_000));
        assert!(parts.iter().all(|p| p.ends_with('.')), "Parts end on sentence boundaries");
    }

    #[test]
    fn test_too_many_parts_are_re_merged() {
        // ARRANGE
        let sentence = format!("{}. ", "b".repeat(8_999));
        let text = sentence.repeat(12);

        // ACT
        let parts = split_for_distribution(&text, 15_000, 10, 1.5);

        // ASSERT
        assert!(parts.len() <= 10);
        assert!(parts.iter().all(|p| p.chars().count() <= 22_500));
        let rejoined: usize = parts.iter().map(|p| p.matches('.').count()).sum();
        assert_eq!(rejoined, 12, "No sentence is lost while merging");
    }

    // ============================================================
    // ROUTING & FALLBACK TESTS
    // ============================================================

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let distributor =
            distributor_with(Arc::new(WorkerRegistry::new(Default::default()))).await;

        for (text, ratio) in [("   ", 0.3), ("Text.", 0.0), ("Text.", 1.5), ("Text.", f32::NAN)] {
            let outcome = distributor.distribute(text, ratio, "a.txt").await;
            assert!(
                matches!(outcome, Err(ClusterError::Validation(_))),
                "{text:?} / {ratio} must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_no_workers_equals_local_summarize() {
        // ARRANGE
        let distributor =
            distributor_with(Arc::new(WorkerRegistry::new(Default::default()))).await;
        let text = corpus(3_000);

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        assert_eq!(outcome.mode, ProcessingMode::Local);
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(&text, 0.3));
        assert_eq!(outcome.original_length, text.chars().count());
        assert_eq!(distributor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_single_thread_mode_skips_the_cluster() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let _a = silent_worker(&registry, "a").await;
        let _b = silent_worker(&registry, "b").await;
        let distributor = distributor_with(registry.clone()).await;
        let text = corpus(25_000);

        // ACT
        let outcome = distributor.distribute_local(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        assert_eq!(outcome.mode, ProcessingMode::SingleThread);
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(&text, 0.3));
        assert_eq!(registry.current_tasks(&WorkerId::from("a")), Some(0));
        assert_eq!(registry.current_tasks(&WorkerId::from("b")), Some(0));
        assert_eq!(distributor.status().pending_tasks, 0);
        assert_eq!(distributor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_single_thread_mode_still_validates() {
        let distributor =
            distributor_with(Arc::new(WorkerRegistry::new(Default::default()))).await;

        let outcome = distributor.distribute_local("  ", 0.3, "a.txt").await;

        assert!(matches!(outcome, Err(ClusterError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_falls_back_and_releases_load() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let _worker = silent_worker(&registry, "quiet").await;
        let distributor = distributor_with(registry.clone()).await;
        let text = corpus(2_000);
        let started = Instant::now();

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(outcome.mode, ProcessingMode::Local);
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(&text, 0.3));
        assert_eq!(registry.current_tasks(&WorkerId::from("quiet")), Some(0));
        assert_eq!(distributor.status().pending_tasks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_with_silent_workers_falls_back_to_original() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let _a = silent_worker(&registry, "a").await;
        let _b = silent_worker(&registry, "b").await;
        let distributor = distributor_with(registry.clone()).await;
        let text = corpus(45_000);

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "big.txt").await.unwrap();

        // ASSERT
        assert_eq!(outcome.mode, ProcessingMode::Local);
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(&text, 0.3));
        assert_eq!(registry.current_tasks(&WorkerId::from("a")), Some(0));
        assert_eq!(registry.current_tasks(&WorkerId::from("b")), Some(0));
        assert_eq!(distributor.status().distributed_tasks, 0);
    }

    // ============================================================
    // MERGING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_short_merge_is_returned_as_is() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let distributor = distributor_with(registry.clone()).await;
        let reply: fn(&TaskId) -> String = |id| {
            if id.as_str().ends_with("_part_0") {
                "First half summary.".into()
            } else {
                "Second half summary.".into()
            }
        };
        answering_worker(&registry, distributor.clone(), "a", reply).await;
        answering_worker(&registry, distributor.clone(), "b", reply).await;
        let text = corpus(25_000);

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        assert!(matches!(outcome.mode, ProcessingMode::Distributed { parts: 2, .. }));
        assert_eq!(outcome.summary, "First half summary. Second half summary.");
        assert_eq!(registry.current_tasks(&WorkerId::from("a")), Some(0));
        assert_eq!(registry.current_tasks(&WorkerId::from("b")), Some(0));
        assert_eq!(distributor.status().tasks_processed, 2);
        assert_eq!(distributor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_summarizes_what_came_back() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let transport = TransportConfig {
            part_timeout: Duration::from_secs(2),
            ..TransportConfig::default()
        };
        let distributor =
            distributor_configured(registry.clone(), transport, OrchestratorConfig::default())
                .await;
        let partial = "Alpha part. Beta part. Gamma part.";
        answering_worker(&registry, distributor.clone(), "a", |_| {
            "Alpha part. Beta part. Gamma part.".into()
        })
        .await;
        let _b = silent_worker(&registry, "b").await;
        let text = corpus(25_000);

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        assert!(matches!(outcome.mode, ProcessingMode::Distributed { parts: 2, .. }));
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(partial, 0.3));
        assert_ne!(outcome.summary, partial, "The partial combination is summarized again");
        assert_eq!(registry.current_tasks(&WorkerId::from("a")), Some(0));
        assert_eq!(registry.current_tasks(&WorkerId::from("b")), Some(0));
        assert_eq!(distributor.status().pending_tasks, 0);
        assert_eq!(distributor.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_deadline_falls_back_to_original() {
        // ARRANGE
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        let _a = silent_worker(&registry, "a").await;
        let _b = silent_worker(&registry, "b").await;
        let orchestrator = OrchestratorConfig {
            merge_deadline: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        };
        let distributor =
            distributor_configured(registry.clone(), TransportConfig::default(), orchestrator)
                .await;
        let text = corpus(25_000);
        let started = Instant::now();

        // ACT
        let outcome = distributor.distribute(&text, 0.3, "a.txt").await.unwrap();

        // ASSERT
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(45), "The deadline beats the part timeout");
        assert_eq!(outcome.mode, ProcessingMode::Local);
        assert_eq!(outcome.summary, TextRankSummarizer::new().summarize(&text, 0.3));
        assert_eq!(distributor.status().distributed_tasks, 0);
        assert_eq!(distributor.in_flight(), 0);

        // Detached dispatches time out on their own and give the slots back.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(distributor.status().pending_tasks, 0);
        assert_eq!(registry.current_tasks(&WorkerId::from("a")), Some(0));
        assert_eq!(registry.current_tasks(&WorkerId::from("b")), Some(0));
    }

    // ============================================================
    // RESULT ROUTING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_orphan_result_is_attached_to_sub_task() {
        // ARRANGE
        let distributor =
            distributor_with(Arc::new(WorkerRegistry::new(Default::default()))).await;
        let parent = TaskId::from("parent");
        distributor.track(DistributedTask {
            task_id: parent.clone(),
            ratio: 0.3,
            file_name: "a.txt".into(),
            created_at: Instant::now(),
            sub_tasks: vec![SubTask {
                task_id: parent.part(0),
                worker_id: WorkerId::from("w"),
                text: "Part.".into(),
                index: 0,
                processed: false,
                result: None,
            }],
        });

        // ACT
        distributor.resolve_result(TaskReport::success(
            parent.part(0),
            "Late summary.".into(),
            "a.txt".into(),
        ));

        // ASSERT
        let record = distributor.tracked(&parent).unwrap();
        assert!(record.sub_tasks[0].processed);
        assert_eq!(record.sub_tasks[0].result.as_deref(), Some("Late summary."));
        assert_eq!(distributor.status().tasks_processed, 0, "Orphans are not counted");
    }

    #[tokio::test]
    async fn test_completion_notice_releases_slot() {
        let registry = Arc::new(WorkerRegistry::new(Default::default()));
        registry.register_or_refresh(WorkerId::from("w"), LOCALHOST, 7000);
        let distributor = distributor_with(registry.clone()).await;
        registry.select_one().unwrap();

        distributor.resolve_completion_notice(&WorkerId::from("w"), &TaskId::from("t"));
        distributor.resolve_completion_notice(&WorkerId::from("w"), &TaskId::from("t"));

        assert_eq!(registry.current_tasks(&WorkerId::from("w")), Some(0));
    }

    // ============================================================
    // END-TO-END TESTS (loopback UDP)
    // ============================================================

    async fn cluster(workers: usize) -> (Arc<MasterNode>, Vec<Arc<SlaveNode>>) {
        let config = MasterConfig {
            bind_ip: LOCALHOST,
            registration_port: 0,
            result_port: 0,
            ..MasterConfig::default()
        };
        let master = MasterNode::bind(config, Arc::new(TextRankSummarizer::new()))
            .await
            .unwrap();
        master.clone().start().await;

        let mut nodes = Vec::new();
        for _ in 0..workers {
            let config = WorkerConfig {
                bind_ip: LOCALHOST,
                port_range: 0..=0,
                master_addr: master.registration_addr().unwrap(),
                ..WorkerConfig::default()
            };
            let node = SlaveNode::bind(config, Arc::new(TextRankSummarizer::new()))
                .await
                .unwrap();
            node.clone().start().await;
            nodes.push(node);
        }

        wait_until(|| master.registry().active_count() == workers).await;
        (master, nodes)
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_split_across_two_workers() {
        // ARRANGE
        let (master, nodes) = cluster(2).await;
        let text = corpus(25_000);
        let original = text.chars().count();

        // ACT
        let outcome = master.summarize(&text, 0.3, "e2e.txt").await.unwrap();

        // ASSERT
        let ProcessingMode::Distributed { parts, workers } = &outcome.mode else {
            panic!("expected a distributed run, got {:?}", outcome.mode);
        };
        assert_eq!(*parts, 2);
        let used: HashSet<&WorkerId> = workers.iter().collect();
        let expected: HashSet<&WorkerId> = nodes.iter().map(|n| n.id()).collect();
        assert_eq!(used, expected);

        assert!(!outcome.summary.is_empty());
        assert!(outcome.summary_length <= original);
        assert_eq!(outcome.original_length, original);
        let expected_ratio = 1.0 - outcome.summary_length as f32 / original as f32;
        assert!((outcome.compression_ratio - expected_ratio).abs() < 1e-6);

        wait_until(|| {
            master
                .status()
                .workers
                .iter()
                .all(|w| w.current_tasks == 0)
        })
        .await;
        assert_eq!(master.status().tasks_processed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_chunked_direct_task() {
        // ARRANGE
        let (master, nodes) = cluster(1).await;
        let text = corpus(70_000);

        // ACT
        let outcome = master.summarize(&text, 0.1, "large.txt").await.unwrap();

        // ASSERT
        assert_eq!(
            outcome.mode,
            ProcessingMode::Direct {
                worker: nodes[0].id().clone()
            }
        );
        assert!(outcome.summary_length < outcome.original_length);
        assert_eq!(nodes[0].pending_reassemblies(), 0);
        wait_until(|| master.registry().current_tasks(nodes[0].id()) == Some(0)).await;
    }
}
