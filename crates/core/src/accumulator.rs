//! Reassembles streamed responses.
//!
//! Providers stream tool calls as fragments keyed by a positional index. The
//! fragments of different calls may interleave, and only the first fragment
//! of a call usually carries its id and name. [`ToolCallAccumulator`] keeps
//! one slot per index and turns them into complete [`ToolCallRequest`]s at
//! the round boundary, while [`StreamAccumulator`] reduces a whole round.

use std::collections::{BTreeMap, HashSet};

use luna_model::{
    AssistantMessage, ModelFinishReason, ModelResponseEvent, ToolCallFragment,
    ToolCallRequest,
};

#[derive(Debug, Default)]
struct Slot {
    id: Option<String>,
    kind: Option<String>,
    name: String,
    arguments: String,
}

/// Collects tool call fragments until the round completes.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<u32, Slot>,
}

impl ToolCallAccumulator {
    /// Merges a fragment into the slot of its index.
    ///
    /// `id` and `kind` overwrite earlier values, `name` and `arguments` are
    /// appended in arrival order.
    pub fn merge(&mut self, fragment: ToolCallFragment) {
        let slot = self.slots.entry(fragment.index).or_default();
        if let Some(id) = fragment.id {
            slot.id = Some(id);
        }
        if let Some(kind) = fragment.kind {
            slot.kind = Some(kind);
        }
        if let Some(name) = fragment.name {
            slot.name.push_str(&name);
        }
        if let Some(arguments) = fragment.arguments {
            slot.arguments.push_str(&arguments);
        }
    }

    /// Returns `true` if no fragment has been merged since the last drain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Finalizes every slot in index order and clears them.
    ///
    /// Slots are finalized even if they look incomplete. A slot that never
    /// received an id gets `call_<index>`, suffixed if the round already has
    /// a call with that id.
    pub fn drain(&mut self) -> Vec<ToolCallRequest> {
        self.drain_after(&[])
    }

    /// Like [`drain`](Self::drain), keeping synthetic ids distinct from the
    /// ids of `earlier` calls of the same round.
    fn drain_after(&mut self, earlier: &[ToolCallRequest]) -> Vec<ToolCallRequest> {
        let slots = std::mem::take(&mut self.slots);
        let mut taken: HashSet<String> = earlier
            .iter()
            .map(|call| call.id.clone())
            .chain(slots.values().filter_map(|slot| slot.id.clone()))
            .collect();

        slots
            .into_iter()
            .map(|(index, slot)| {
                if let Some(kind) = slot.kind.as_deref() {
                    if kind != "function" {
                        warn!("tool call {index} has unexpected kind: {kind}");
                    }
                }
                let id = slot.id.unwrap_or_else(|| {
                    let id = synthetic_id(index, &taken);
                    warn!("tool call {index} has no id, using {id}");
                    taken.insert(id.clone());
                    id
                });
                ToolCallRequest {
                    id,
                    name: slot.name,
                    arguments: slot.arguments,
                }
            })
            .collect()
    }
}

fn synthetic_id(index: u32, taken: &HashSet<String>) -> String {
    let base = format!("call_{index}");
    if !taken.contains(&base) {
        return base;
    }
    let mut suffix = 1;
    loop {
        let id = format!("{base}_{suffix}");
        if !taken.contains(&id) {
            return id;
        }
        suffix += 1;
    }
}

/// The reduced result of one model round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutput {
    /// All text fragments, concatenated.
    pub text: String,
    /// Finalized tool calls in index order.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Why the model stopped.
    pub finish_reason: ModelFinishReason,
}

impl RoundOutput {
    /// Converts the output into the assistant message recorded in the log.
    pub fn into_message(self) -> AssistantMessage {
        let content = if self.text.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(self.text)
        };
        AssistantMessage {
            content,
            tool_calls: self.tool_calls,
        }
    }
}

/// Reduces the events of one streamed round.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    pending: ToolCallAccumulator,
    tool_calls: Vec<ToolCallRequest>,
    finish_reason: Option<ModelFinishReason>,
}

impl StreamAccumulator {
    /// Creates an empty accumulator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes an event, returning the text fragment to forward, if any.
    pub fn accept(&mut self, event: ModelResponseEvent) -> Option<String> {
        match event {
            ModelResponseEvent::TextFragment(text) => {
                self.text.push_str(&text);
                Some(text)
            }
            ModelResponseEvent::ToolCallFragment(fragment) => {
                self.pending.merge(fragment);
                None
            }
            ModelResponseEvent::RoundComplete(reason) => {
                if !self.pending.is_empty() {
                    let calls = self.pending.drain_after(&self.tool_calls);
                    self.tool_calls.extend(calls);
                }
                self.finish_reason = Some(reason);
                None
            }
        }
    }

    /// Ends the round.
    ///
    /// Slots still open because the stream ended without a completion event
    /// are drained here as well.
    pub fn finish(mut self) -> RoundOutput {
        if !self.pending.is_empty() {
            debug!("stream ended with open tool call slots");
            let calls = self.pending.drain_after(&self.tool_calls);
            self.tool_calls.extend(calls);
        }
        let finish_reason = self.finish_reason.unwrap_or_else(|| {
            if self.tool_calls.is_empty() {
                ModelFinishReason::Stop
            } else {
                ModelFinishReason::ToolCalls
            }
        });
        RoundOutput {
            text: self.text,
            tool_calls: self.tool_calls,
            finish_reason,
        }
    }
}
