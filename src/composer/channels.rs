// Channel palette - Collapse source channels onto a bounded set of output channels
// A role is (program, source channel); the same role from different files shares one output channel

use std::collections::BTreeMap;

use crate::corpus::DRUM_CHANNEL;

/// Melodic channels in allocation order (everything except percussion)
const MELODIC_CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

/// One instrument role and the output channel it plays on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Role {
    program: u8,
    source_channel: u8,
    channel: u8,
}

/// Assigns output channels by instrument role
///
/// Two parts sharing a program on different source channels (left and right
/// hand, say) keep separate output channels while there is room. Once the
/// palette is full, a new role joins a channel already playing its program,
/// or failing that is folded round-robin.
#[derive(Debug, Clone)]
pub struct ChannelPalette {
    max_channels: usize,

    /// Roles that own an output channel, in first-seen order
    roles: Vec<Role>,

    /// Roles that arrived after the palette was full, and where they went
    folded: Vec<Role>,

    uses_drums: bool,
}

impl ChannelPalette {
    /// `max_channels` is clamped to 1..=15 melodic channels
    pub fn new(max_channels: usize) -> Self {
        ChannelPalette {
            max_channels: max_channels.clamp(1, MELODIC_CHANNELS.len()),
            roles: Vec::new(),
            folded: Vec::new(),
            uses_drums: false,
        }
    }

    /// Output channel for a note played on `source_channel` with `program`
    pub fn assign(&mut self, source_channel: u8, program: u8) -> u8 {
        if source_channel == DRUM_CHANNEL {
            self.uses_drums = true;
            return DRUM_CHANNEL;
        }

        if let Some(role) = self
            .roles
            .iter()
            .chain(self.folded.iter())
            .find(|r| r.program == program && r.source_channel == source_channel)
        {
            return role.channel;
        }

        if self.roles.len() < self.max_channels {
            let channel = MELODIC_CHANNELS[self.roles.len()];
            self.roles.push(Role {
                program,
                source_channel,
                channel,
            });
            return channel;
        }

        let channel = match self.roles.iter().find(|r| r.program == program) {
            Some(same_program) => {
                log::debug!(
                    "Channel palette full: source channel {} (program {}) joins channel {}",
                    source_channel,
                    program,
                    same_program.channel
                );
                same_program.channel
            }
            None => {
                let owner = self.roles[self.folded.len() % self.roles.len()];
                log::warn!(
                    "Channel palette full ({} channels): program {} shares channel {} with program {}",
                    self.max_channels,
                    program,
                    owner.channel,
                    owner.program
                );
                owner.channel
            }
        };

        self.folded.push(Role {
            program,
            source_channel,
            channel,
        });
        channel
    }

    /// Program to announce on each used melodic channel
    pub fn programs(&self) -> BTreeMap<u8, u8> {
        self.roles.iter().map(|r| (r.channel, r.program)).collect()
    }

    /// Number of distinct output channels in use
    pub fn channel_count(&self) -> usize {
        self.roles.len() + usize::from(self.uses_drums)
    }
}
