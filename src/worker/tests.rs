//! Worker Module Tests
//!
//! ## Test Scopes
//! - **Reassembly**: Order independence, duplicates, gaps and stalled buffers.
//! - **Node**: Registration, direct and chunked processing against a fake coordinator socket.

#[cfg(test)]
mod tests {
    use crate::config::WorkerConfig;
    use crate::summarizer::Summarizer;
    use crate::summarizer::sentences::split_sentences;
    use crate::transport::chunking::split_into_chunks;
    use crate::transport::types::{ChunkMetadata, SlaveTask, TaskChunk, TaskId, TaskReport};
    use crate::transport::wire::WireMessage;
    use crate::worker::node::SlaveNode;
    use crate::worker::reassembly::ChunkAssembler;
    use crate::worker::types::{Assembled, ChunkAccept};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    struct FirstSentence;

    impl Summarizer for FirstSentence {
        fn summarize(&self, text: &str, _ratio: f32) -> String {
            split_sentences(text).first().copied().unwrap_or_default().to_string()
        }
    }

    struct Silent;

    impl Summarizer for Silent {
        fn summarize(&self, _text: &str, _ratio: f32) -> String {
            String::new()
        }
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:6001".parse().unwrap()
    }

    fn metadata(task_id: &str, total_chunks: usize) -> ChunkMetadata {
        ChunkMetadata {
            task_id: TaskId::from(task_id),
            ratio: 0.3,
            file_name: "doc.txt".into(),
            total_chunks,
            chunk_size: 4,
            text_length: total_chunks * 4,
            master_callback_port: 6001,
        }
    }

    fn chunk(task_id: &str, index: usize, data: &str, last: bool) -> TaskChunk {
        TaskChunk {
            task_id: TaskId::from(task_id),
            chunk_index: index,
            data: data.into(),
            is_last_chunk: last,
        }
    }

    // ============================================================
    // REASSEMBLY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_reassembly_is_order_independent() {
        let parts = ["aaaa", "bbbb", "cccc", "dddd"];
        let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]];

        for order in orders {
            // ARRANGE
            let assembler = ChunkAssembler::new();
            assembler.begin(metadata("t", 4), addr()).unwrap();

            // ACT
            let mut finalize_signals = 0;
            for &i in &order {
                let accepted = assembler.accept_chunk(chunk("t", i, parts[i], i == 3), addr());
                if accepted == ChunkAccept::Finalize {
                    finalize_signals += 1;
                }
            }

            // ASSERT
            assert_eq!(finalize_signals, 1, "Finalization is triggered once for {order:?}");
            match assembler.take(&TaskId::from("t")) {
                Some(Assembled::Complete { text, .. }) => assert_eq!(text, "aaaabbbbccccdddd"),
                other => panic!("expected complete task for {order:?}, got {other:?}"),
            }
            assert!(assembler.is_empty());
        }
    }

    #[tokio::test]
    async fn test_duplicate_chunks_count_once() {
        let assembler = ChunkAssembler::new();
        assembler.begin(metadata("t", 3), addr()).unwrap();

        assert_eq!(assembler.accept_chunk(chunk("t", 0, "aaaa", false), addr()), ChunkAccept::Stored);
        assert_eq!(
            assembler.accept_chunk(chunk("t", 0, "zzzz", false), addr()),
            ChunkAccept::Duplicate
        );
        assert_eq!(assembler.accept_chunk(chunk("t", 1, "bbbb", false), addr()), ChunkAccept::Stored);
        assert!(!assembler.is_complete(&TaskId::from("t")));

        assert_eq!(assembler.accept_chunk(chunk("t", 2, "cc", true), addr()), ChunkAccept::Finalize);
        match assembler.take(&TaskId::from("t")) {
            Some(Assembled::Complete { text, .. }) => assert_eq!(text, "aaaabbbbcc"),
            other => panic!("expected complete task, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_chunk_is_reported_incomplete() {
        // ARRANGE
        let assembler = ChunkAssembler::new();
        assembler.begin(metadata("t", 3), addr()).unwrap();

        // ACT
        assembler.accept_chunk(chunk("t", 0, "aaaa", false), addr());
        let accepted = assembler.accept_chunk(chunk("t", 2, "cccc", true), addr());

        // ASSERT
        assert_eq!(accepted, ChunkAccept::Finalize, "Last-chunk flag triggers finalization");
        match assembler.take(&TaskId::from("t")) {
            Some(Assembled::Incomplete { missing, .. }) => assert_eq!(missing, vec![1]),
            other => panic!("expected incomplete task, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reassembly_rejects_bad_input() {
        let assembler = ChunkAssembler::new();

        assert!(assembler.begin(metadata("zero", 0), addr()).is_err());
        assert_eq!(
            assembler.accept_chunk(chunk("unknown", 0, "x", true), addr()),
            ChunkAccept::UnknownTask
        );

        assembler.begin(metadata("t", 2), addr()).unwrap();
        assert_eq!(
            assembler.accept_chunk(chunk("t", 5, "x", false), addr()),
            ChunkAccept::OutOfRange
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_buffers_are_swept() {
        let assembler = ChunkAssembler::new();
        assembler.begin(metadata("old", 2), addr()).unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        assembler.begin(metadata("new", 2), addr()).unwrap();
        tokio::time::advance(Duration::from_secs(101)).await;

        let removed = assembler.sweep_stalled(Duration::from_secs(300));

        assert_eq!(removed, vec![TaskId::from("old")]);
        assert_eq!(assembler.len(), 1);
    }

    // ============================================================
    // NODE TESTS
    // ============================================================

    struct FakeCoordinator {
        socket: UdpSocket,
        node: Arc<SlaveNode>,
    }

    impl FakeCoordinator {
        async fn start(summarizer: Arc<dyn Summarizer>) -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let config = WorkerConfig {
                bind_ip: "127.0.0.1".parse().unwrap(),
                port_range: 0..=0,
                master_addr: socket.local_addr().unwrap(),
                finalize_grace: Duration::from_millis(300),
                finalize_poll: Duration::from_millis(100),
                ..WorkerConfig::default()
            };
            let node = SlaveNode::bind(config, summarizer).await.unwrap();
            node.clone().start().await;
            Self { socket, node }
        }

        fn callback_port(&self) -> u16 {
            self.socket.local_addr().unwrap().port()
        }

        async fn send(&self, message: WireMessage) {
            let encoded = message.encode().unwrap();
            self.socket
                .send_to(encoded.as_bytes(), self.node.local_addr())
                .await
                .unwrap();
        }

        /// Next message that is not a heartbeat.
        async fn recv(&self) -> WireMessage {
            let mut buf = vec![0u8; 65_536];
            loop {
                let (len, _) = tokio::time::timeout(
                    Duration::from_secs(5),
                    self.socket.recv_from(&mut buf),
                )
                .await
                .expect("worker went quiet")
                .unwrap();
                let message = WireMessage::decode(&buf[..len]).unwrap();
                if !matches!(message, WireMessage::Heartbeat { .. }) {
                    return message;
                }
            }
        }

        async fn recv_report(&self) -> TaskReport {
            loop {
                if let WireMessage::TaskResult(report) = self.recv().await {
                    return report;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_worker_registers_with_its_port() {
        let fake = FakeCoordinator::start(Arc::new(FirstSentence)).await;

        let message = fake.recv().await;

        assert_eq!(
            message,
            WireMessage::Register {
                worker_id: fake.node.id().clone(),
                port: fake.node.local_addr().port(),
            }
        );
        assert!(fake.node.id().0.starts_with("Slave_"));
    }

    #[tokio::test]
    async fn test_direct_task_reports_result_then_completion() {
        // ARRANGE
        let fake = FakeCoordinator::start(Arc::new(FirstSentence)).await;
        fake.recv().await;

        // ACT
        fake.send(WireMessage::Task(SlaveTask {
            task_id: TaskId::from("direct-1"),
            text: "First sentence. Second sentence.".into(),
            ratio: 0.5,
            file_name: "a.txt".into(),
            master_callback_port: fake.callback_port(),
        }))
        .await;

        // ASSERT
        let report = fake.recv_report().await;
        assert!(report.success);
        assert_eq!(report.summary, "First sentence.");
        assert_eq!(report.file_name, "a.txt");
        assert_eq!(
            fake.recv().await,
            WireMessage::TaskComplete {
                worker_id: fake.node.id().clone(),
                task_id: TaskId::from("direct-1"),
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_direct_task_reports_failure() {
        let fake = FakeCoordinator::start(Arc::new(FirstSentence)).await;
        fake.recv().await;

        fake.send(WireMessage::Task(SlaveTask {
            task_id: TaskId::from("bad-ratio"),
            text: "Some text.".into(),
            ratio: 1.5,
            file_name: "a.txt".into(),
            master_callback_port: fake.callback_port(),
        }))
        .await;

        let report = fake.recv_report().await;
        assert!(!report.success);
        assert!(report.summary.is_empty());
    }

    #[tokio::test]
    async fn test_empty_summary_is_a_failure() {
        let fake = FakeCoordinator::start(Arc::new(Silent)).await;
        fake.recv().await;

        fake.send(WireMessage::Task(SlaveTask {
            task_id: TaskId::from("silent"),
            text: "Some text. More text.".into(),
            ratio: 0.3,
            file_name: "a.txt".into(),
            master_callback_port: fake.callback_port(),
        }))
        .await;

        let report = fake.recv_report().await;
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_chunked_task_out_of_order_is_summarized() {
        // ARRANGE
        let fake = FakeCoordinator::start(Arc::new(FirstSentence)).await;
        fake.recv().await;
        let text = "Opening line of the document. ".repeat(40);
        let chunks = split_into_chunks(&text, 100);
        let total = chunks.len();

        // ACT
        fake.send(WireMessage::TaskStart(ChunkMetadata {
            task_id: TaskId::from("chunked-1"),
            ratio: 0.3,
            file_name: "big.txt".into(),
            total_chunks: total,
            chunk_size: 100,
            text_length: text.chars().count(),
            master_callback_port: fake.callback_port(),
        }))
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        for index in (0..total).rev() {
            fake.send(WireMessage::TaskChunk(TaskChunk {
                task_id: TaskId::from("chunked-1"),
                chunk_index: index,
                data: chunks[index].to_string(),
                is_last_chunk: index + 1 == total,
            }))
            .await;
        }

        // ASSERT
        let report = fake.recv_report().await;
        assert_eq!(report.task_id, TaskId::from("chunked-1"));
        assert!(report.success);
        assert_eq!(report.summary, "Opening line of the document.");
        assert_eq!(fake.node.pending_reassemblies(), 0);
    }

    #[tokio::test]
    async fn test_chunked_task_with_gap_reports_failure() {
        // ARRANGE
        let fake = FakeCoordinator::start(Arc::new(FirstSentence)).await;
        fake.recv().await;

        // ACT
        fake.send(WireMessage::TaskStart(ChunkMetadata {
            task_id: TaskId::from("gappy"),
            ratio: 0.3,
            file_name: "big.txt".into(),
            total_chunks: 3,
            chunk_size: 4,
            text_length: 12,
            master_callback_port: fake.callback_port(),
        }))
        .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        for (index, data) in [(0, "One."), (2, " Tw.")] {
            fake.send(WireMessage::TaskChunk(TaskChunk {
                task_id: TaskId::from("gappy"),
                chunk_index: index,
                data: data.into(),
                is_last_chunk: index == 2,
            }))
            .await;
        }

        // ASSERT
        let report = fake.recv_report().await;
        assert_eq!(report.task_id, TaskId::from("gappy"));
        assert!(!report.success);
        assert!(report.summary.is_empty());
    }
}
