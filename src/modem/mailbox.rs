//! Inbound message worklist.
//!
//! Commands must be handled oldest-first, and a command must never be
//! replayed after a crash, so every message is deleted from the SIM before
//! its content is acted on. A deletion failure keeps the message out of the
//! worklist for this cycle; it will be picked up again next time.

use log::{debug, warn};

use crate::hal::SerialIo;
use crate::modem::engine::ModemEngine;
use crate::modem::wire::SmsMessage;

/// Fetch every stored message, ordered oldest-first, each already deleted
/// from the SIM. Messages without a parseable timestamp sort first within
/// their storage order.
pub fn fetch_worklist<S: SerialIo>(engine: &ModemEngine<S>) -> Vec<SmsMessage> {
    let mut messages = match engine.list_messages() {
        Ok(messages) => messages,
        Err(e) => {
            warn!("message fetch failed: {e}");
            return Vec::new();
        }
    };

    messages.sort_by_key(|msg| (msg.sent_time, msg.id));

    let mut worklist = Vec::with_capacity(messages.len());
    for msg in messages {
        // Delete-before-process: once we act on a command it must already
        // be gone from storage.
        match engine.delete_message(msg.id) {
            Ok(()) => {
                debug!("message {} consumed from SIM", msg.id);
                worklist.push(msg);
            }
            Err(e) => {
                warn!("leaving message {} on SIM (delete failed: {e})", msg.id);
            }
        }
    }
    worklist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::engine::ModemTiming;
    use crate::hal::sim::ScriptedSerial;
    use crossbeam_channel::unbounded;

    fn engine() -> (ModemEngine<ScriptedSerial>, crate::hal::sim::SerialScript) {
        let (serial, script) = ScriptedSerial::new();
        let (_tx, rx) = unbounded();
        (ModemEngine::new(serial, ModemTiming::instant(), 1, rx), script)
    }

    #[test]
    fn worklist_is_ordered_oldest_first_and_deleted() {
        let (engine, script) = engine();
        script.enqueue(concat!(
            "+CMGL: 9,\"REC UNREAD\",\"+12065551234\",\"\",\"17/06/03\",\"10:00:00-32\"\r\n",
            "status\r\n",
            "+CMGL: 2,\"REC READ\",\"+12065551234\",\"\",\"17/06/03\",\"09:00:00-32\"\r\n",
            "on\r\n",
            "OK\r\n",
        ));
        // CMGD replies, one per message.
        script.enqueue("OK\r\n");
        script.enqueue("OK\r\n");

        let worklist = fetch_worklist(&engine);
        assert_eq!(worklist.len(), 2);
        assert_eq!(worklist[0].text, "on", "older message first");
        assert_eq!(worklist[1].text, "status");

        let written = script.written_text();
        assert!(written.contains("AT+CMGD=2"));
        assert!(written.contains("AT+CMGD=9"));
    }

    #[test]
    fn delete_failure_holds_message_for_next_cycle() {
        let (engine, script) = engine();
        script.enqueue(concat!(
            "+CMGL: 1,\"REC UNREAD\",\"+12065551234\",\"\",\"17/06/03\",\"09:00:00-32\"\r\n",
            "off\r\n",
            "OK\r\n",
            // No reply for the CMGD exchange: deletion times out.
        ));

        let worklist = fetch_worklist(&engine);
        assert!(worklist.is_empty(), "undeleted message must not be processed");
    }

    #[test]
    fn fetch_failure_yields_empty_worklist() {
        let (engine, _script) = engine();
        // No scripted reply at all: the CMGL exchange times out.
        assert!(fetch_worklist(&engine).is_empty());
    }
}
