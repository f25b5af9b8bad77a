//! Datagram Codec
//!
//! Every datagram is UTF-8 text of the form `<TAG>:<payload>`. Structured
//! payloads are JSON; the small control messages use colon-separated fields.
//! Decoding is closed: an unknown tag or a malformed payload is a protocol
//! error, never silently ignored.

use super::types::{ChunkMetadata, SlaveTask, TaskChunk, TaskId, TaskReport};
use crate::error::{ClusterError, Result};
use crate::membership::types::WorkerId;

pub const TAG_REGISTER: &str = "REGISTER";
pub const TAG_HEARTBEAT: &str = "HEARTBEAT";
pub const TAG_TASK: &str = "TASK";
pub const TAG_TASK_START: &str = "TASK_START";
pub const TAG_TASK_CHUNK: &str = "TASK_CHUNK";
pub const TAG_TASK_RESULT: &str = "TASK_RESULT";
pub const TAG_TASK_COMPLETE: &str = "TASK_COMPLETE";

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// worker → coordinator, `REGISTER:<workerId>:<port>`
    Register { worker_id: WorkerId, port: u16 },
    /// worker → coordinator, `HEARTBEAT:<workerId>`
    Heartbeat { worker_id: WorkerId },
    /// coordinator → worker
    Task(SlaveTask),
    /// coordinator → worker
    TaskStart(ChunkMetadata),
    /// coordinator → worker
    TaskChunk(TaskChunk),
    /// worker → coordinator result port
    TaskResult(TaskReport),
    /// worker → coordinator registration port, `TASK_COMPLETE:<workerId>:<taskId>`
    TaskComplete { worker_id: WorkerId, task_id: TaskId },
}

impl WireMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            WireMessage::Register { .. } => TAG_REGISTER,
            WireMessage::Heartbeat { .. } => TAG_HEARTBEAT,
            WireMessage::Task(_) => TAG_TASK,
            WireMessage::TaskStart(_) => TAG_TASK_START,
            WireMessage::TaskChunk(_) => TAG_TASK_CHUNK,
            WireMessage::TaskResult(_) => TAG_TASK_RESULT,
            WireMessage::TaskComplete { .. } => TAG_TASK_COMPLETE,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let payload = match self {
            WireMessage::Register { worker_id, port } => format!("{}:{}", worker_id, port),
            WireMessage::Heartbeat { worker_id } => worker_id.to_string(),
            WireMessage::Task(task) => serde_json::to_string(task)?,
            WireMessage::TaskStart(meta) => serde_json::to_string(meta)?,
            WireMessage::TaskChunk(chunk) => serde_json::to_string(chunk)?,
            WireMessage::TaskResult(report) => serde_json::to_string(report)?,
            WireMessage::TaskComplete { worker_id, task_id } => {
                format!("{}:{}", worker_id, task_id)
            }
        };

        Ok(format!("{}:{}", self.tag(), payload))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ClusterError::protocol(format!("datagram is not UTF-8: {e}")))?;

        let (tag, payload) = text
            .split_once(':')
            .ok_or_else(|| ClusterError::protocol("datagram has no tag separator"))?;

        match tag {
            TAG_REGISTER => {
                let (id, port) = payload
                    .rsplit_once(':')
                    .ok_or_else(|| ClusterError::protocol("REGISTER needs <id>:<port>"))?;
                let port = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ClusterError::protocol(format!("bad REGISTER port {port:?}")))?;
                Ok(WireMessage::Register {
                    worker_id: non_empty_worker(id)?,
                    port,
                })
            }
            TAG_HEARTBEAT => Ok(WireMessage::Heartbeat {
                worker_id: non_empty_worker(payload)?,
            }),
            TAG_TASK => Ok(WireMessage::Task(serde_json::from_str(payload)?)),
            TAG_TASK_START => Ok(WireMessage::TaskStart(serde_json::from_str(payload)?)),
            TAG_TASK_CHUNK => Ok(WireMessage::TaskChunk(serde_json::from_str(payload)?)),
            TAG_TASK_RESULT => Ok(WireMessage::TaskResult(serde_json::from_str(payload)?)),
            TAG_TASK_COMPLETE => {
                let (id, task_id) = payload
                    .split_once(':')
                    .ok_or_else(|| ClusterError::protocol("TASK_COMPLETE needs <id>:<taskId>"))?;
                if task_id.trim().is_empty() {
                    return Err(ClusterError::protocol("TASK_COMPLETE without task id"));
                }
                Ok(WireMessage::TaskComplete {
                    worker_id: non_empty_worker(id)?,
                    task_id: TaskId(task_id.trim().to_string()),
                })
            }
            other => Err(ClusterError::protocol(format!("unknown tag {other:?}"))),
        }
    }
}

fn non_empty_worker(raw: &str) -> Result<WorkerId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ClusterError::protocol("empty worker id"));
    }
    Ok(WorkerId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_messages_use_plain_fields() {
        let register = WireMessage::Register {
            worker_id: WorkerId::from("Slave_0000abcd"),
            port: 7003,
        };
        assert_eq!(register.encode().unwrap(), "REGISTER:Slave_0000abcd:7003");

        let complete = WireMessage::TaskComplete {
            worker_id: WorkerId::from("Slave_0000abcd"),
            task_id: TaskId::from("t-1_part_0"),
        };
        assert_eq!(
            WireMessage::decode(complete.encode().unwrap().as_bytes()).unwrap(),
            complete
        );
    }

    #[test]
    fn test_task_payload_is_camel_case_json() {
        let task = WireMessage::Task(SlaveTask {
            task_id: TaskId::from("t-1"),
            text: "Hello: world.".into(),
            ratio: 0.3,
            file_name: "a.txt".into(),
            master_callback_port: 6001,
        });

        let encoded = task.encode().unwrap();

        assert!(encoded.starts_with("TASK:{"));
        assert!(encoded.contains("\"taskId\":\"t-1\""));
        assert!(encoded.contains("\"masterCallbackPort\":6001"));
        assert_eq!(WireMessage::decode(encoded.as_bytes()).unwrap(), task);
    }

    #[test]
    fn test_decode_rejects_unknown_and_malformed() {
        assert!(matches!(
            WireMessage::decode(b"GOSSIP:hello"),
            Err(ClusterError::Protocol(_))
        ));
        assert!(matches!(
            WireMessage::decode(b"no separator"),
            Err(ClusterError::Protocol(_))
        ));
        assert!(matches!(
            WireMessage::decode(b"REGISTER:Slave_1:notaport"),
            Err(ClusterError::Protocol(_))
        ));
        assert!(matches!(
            WireMessage::decode(b"TASK_RESULT:{not json"),
            Err(ClusterError::Serialization(_))
        ));
        assert!(matches!(
            WireMessage::decode(&[0xff, 0xfe, b':']),
            Err(ClusterError::Protocol(_))
        ));
    }
}
