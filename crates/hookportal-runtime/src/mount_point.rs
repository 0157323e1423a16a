//! Per-channel mount point rendered by the handler.

use std::rc::Rc;

use hookportal_core::{Channel, ChannelHelpers, ChannelId, Node, ProbeOutput, RenderScope, Result};

/// Evaluates one channel's probe inside the tree and reports each committed
/// output to the channel resolver. Renders nothing.
#[derive(Debug)]
pub struct ChannelMountPoint {
    channel: Channel,
    helpers: ChannelHelpers,
    last: Option<ProbeOutput>,
    evaluations: u64,
    finalized: bool,
}

impl ChannelMountPoint {
    #[must_use]
    pub fn new(channel: Channel, helpers: ChannelHelpers) -> Self {
        Self {
            channel,
            helpers,
            last: None,
            evaluations: 0,
            finalized: false,
        }
    }

    #[must_use]
    pub fn channel_id(&self) -> &ChannelId {
        self.channel.id()
    }

    /// How many times the probe has run.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    #[must_use]
    pub fn last_output(&self) -> Option<&ProbeOutput> {
        self.last.as_ref()
    }
}

impl Node for ChannelMountPoint {
    fn render(&mut self, scope: &dyn RenderScope) {
        self.last = Some(self.channel.evaluate(scope));
        self.evaluations += 1;
    }

    fn commit(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let Some(output) = self.last.clone() else {
            return Ok(());
        };
        if let Ok(state) = &output {
            self.helpers.dispatch_new_state(Rc::clone(state));
        }
        self.channel.deliver(Some(output), false);
        Ok(())
    }

    /// Final delivery with `before_unmount = true`. Runs at most once.
    fn cleanup(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.finalized, true) {
            return Ok(());
        }
        tracing::trace!(channel_id = %self.channel.id(), "mount point removed");
        self.channel.deliver(self.last.clone(), true);
        Ok(())
    }
}
