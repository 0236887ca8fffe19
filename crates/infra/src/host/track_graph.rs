//! Ordered in-memory track list implementing the core `TrackGraph` bridge
//!
//! Tracks are kept in host order: a child always sits after its parent and
//! before the parent's next sibling, like a DAW's folder hierarchy.

use ambroute_core::domain::apply::{SendHandle, SendInfo, TrackGraph, TrackGraphError, TrackHandle};
use tracing::{debug, trace, warn};

/// Outbound send from one track to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSend {
    /// `None` once the destination track has been removed
    pub destination: Option<TrackHandle>,
    /// Zero-based destination channel
    pub channel: u32,
    pub mono: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub handle: TrackHandle,
    pub name: String,
    pub parent: Option<TrackHandle>,
    pub folder: bool,
    pub sends: Vec<TrackSend>,
}

/// Closed undo transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub label: String,
    pub edits: usize,
}

#[derive(Debug, Default)]
pub struct MemoryTrackGraph {
    tracks: Vec<Track>,
    next_id: u64,
    open: Option<Transaction>,
    history: Vec<Transaction>,
    refreshes: usize,
}

impl MemoryTrackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track as the last descendant of `parent` (or at the end)
    pub fn add_track(&mut self, name: &str, parent: Option<TrackHandle>, folder: bool) -> TrackHandle {
        self.next_id += 1;
        let handle = TrackHandle(self.next_id);

        let position = match parent {
            Some(parent) => self.subtree_end(parent).unwrap_or(self.tracks.len()),
            None => self.tracks.len(),
        };

        self.tracks.insert(
            position,
            Track {
                handle,
                name: name.to_string(),
                parent,
                folder,
                sends: Vec::new(),
            },
        );
        self.record_edit();

        trace!(track = %handle, name, "Track added");
        handle
    }

    pub fn add_send(
        &mut self,
        from: TrackHandle,
        to: TrackHandle,
        channel: u32,
        mono: bool,
    ) -> Result<SendHandle, TrackGraphError> {
        if self.track(to).is_none() {
            return Err(TrackGraphError::UnknownTrack(to));
        }
        let track = self
            .track_mut(from)
            .ok_or(TrackGraphError::UnknownTrack(from))?;

        track.sends.push(TrackSend {
            destination: Some(to),
            channel,
            mono,
        });
        let handle = SendHandle {
            track: from,
            index: track.sends.len() - 1,
        };
        self.record_edit();
        Ok(handle)
    }

    /// Remove a track and all its descendants
    ///
    /// Sends from other tracks into the removed tracks are left dangling.
    pub fn remove_track(&mut self, handle: TrackHandle) -> Result<usize, TrackGraphError> {
        let start = self
            .position(handle)
            .ok_or(TrackGraphError::UnknownTrack(handle))?;
        let end = self.subtree_end(handle).unwrap_or(start + 1);

        let removed: Vec<TrackHandle> = self.tracks.drain(start..end).map(|t| t.handle).collect();
        for track in &mut self.tracks {
            for send in &mut track.sends {
                if send.destination.is_some_and(|d| removed.contains(&d)) {
                    send.destination = None;
                }
            }
        }
        self.record_edit();

        debug!(track = %handle, removed = removed.len(), "Track subtree removed");
        Ok(removed.len())
    }

    pub fn track(&self, handle: TrackHandle) -> Option<&Track> {
        self.tracks.iter().find(|t| t.handle == handle)
    }

    fn track_mut(&mut self, handle: TrackHandle) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.handle == handle)
    }

    /// All tracks in host order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub fn in_transaction(&self) -> bool {
        self.open.is_some()
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes
    }

    fn position(&self, handle: TrackHandle) -> Option<usize> {
        self.tracks.iter().position(|t| t.handle == handle)
    }

    fn is_descendant(&self, track: &Track, ancestor: TrackHandle) -> bool {
        let mut parent = track.parent;
        while let Some(p) = parent {
            if p == ancestor {
                return true;
            }
            parent = self.track(p).and_then(|t| t.parent);
        }
        false
    }

    /// Index one past the last descendant of `handle`
    fn subtree_end(&self, handle: TrackHandle) -> Option<usize> {
        let start = self.position(handle)?;
        let len = self.tracks[start + 1..]
            .iter()
            .take_while(|t| self.is_descendant(t, handle))
            .count();
        Some(start + 1 + len)
    }

    fn record_edit(&mut self) {
        if let Some(transaction) = &mut self.open {
            transaction.edits += 1;
        }
    }
}

impl TrackGraph for MemoryTrackGraph {
    fn find_track_by_name(&self, name: &str) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.parent.is_none() && t.name == name)
            .map(|t| t.handle)
    }

    fn find_child_container_track(&self, parent: TrackHandle, name: &str) -> Option<TrackHandle> {
        self.tracks
            .iter()
            .find(|t| t.parent == Some(parent) && t.name == name)
            .map(|t| t.handle)
    }

    fn is_folder_track(&self, track: TrackHandle) -> bool {
        self.track(track).is_some_and(|t| t.folder)
    }

    fn direct_children(&self, track: TrackHandle) -> Vec<TrackHandle> {
        self.tracks
            .iter()
            .filter(|t| t.parent == Some(track))
            .map(|t| t.handle)
            .collect()
    }

    fn outbound_sends(&self, track: TrackHandle) -> Vec<SendInfo> {
        self.track(track)
            .map(|t| {
                t.sends
                    .iter()
                    .enumerate()
                    .map(|(index, send)| SendInfo {
                        handle: SendHandle { track, index },
                        destination: send.destination,
                        destination_channel: send.channel,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn set_send_destination_channel(
        &mut self,
        send: SendHandle,
        channel: u32,
    ) -> Result<(), TrackGraphError> {
        let entry = self
            .track_mut(send.track)
            .and_then(|t| t.sends.get_mut(send.index))
            .ok_or(TrackGraphError::UnknownSend(send))?;

        entry.channel = channel;
        entry.mono = true;
        self.record_edit();
        Ok(())
    }

    fn begin_transaction(&mut self, label: &str) {
        if let Some(open) = &self.open {
            warn!(open = %open.label, label, "Transaction already open, nesting ignored");
            return;
        }
        self.open = Some(Transaction {
            label: label.to_string(),
            edits: 0,
        });
    }

    fn end_transaction(&mut self, label: &str) {
        match self.open.take() {
            Some(mut transaction) => {
                transaction.label = label.to_string();
                debug!(label, edits = transaction.edits, "Transaction closed");
                self.history.push(transaction);
            }
            None => warn!(label, "No open transaction to end"),
        }
    }

    fn refresh_view(&mut self) {
        self.refreshes += 1;
    }
}
