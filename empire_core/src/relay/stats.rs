use empire_rules::{Message, UserId};
use serde::{Deserialize, Serialize};

/// Workload and reliability figures for one astropath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AstropathStats {
    /// Messages addressed to the astropath.
    pub received: usize,
    /// Received messages that were acknowledged or forwarded.
    pub relayed: usize,
    /// Received messages that were commands.
    pub received_commands: usize,
    /// Messages the astropath transmitted (forwards and status reports).
    pub sent: usize,
    pub distorted: usize,
    /// `relayed / received` as a whole percentage.
    pub delivery_rate: u32,
    /// `distorted / sent` as a whole percentage.
    pub distortion_rate: u32,
}

impl AstropathStats {
    pub(crate) fn tally(astropath: UserId, messages: &[Message]) -> Self {
        let mut stats = AstropathStats::default();
        for message in messages {
            if message.receiver == astropath {
                stats.received += 1;
                if message.delivered() {
                    stats.relayed += 1;
                }
                if message.kind.is_command() {
                    stats.received_commands += 1;
                }
            }
            if message.sender == astropath {
                stats.sent += 1;
                if message.distorted() {
                    stats.distorted += 1;
                }
            }
        }
        stats.delivery_rate = percentage(stats.relayed, stats.received);
        stats.distortion_rate = percentage(stats.distorted, stats.sent);
        stats
    }
}

fn percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        0
    } else {
        (part * 100 / whole) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empire_rules::MessageKind;

    #[test]
    fn test_tally_counts_both_directions() {
        let astropath = UserId::new();
        let trader = UserId::new();
        let governor = UserId::new();

        let mut relayed = Message::new(trader, astropath, MessageKind::UpgradeRequest, "a");
        relayed.deliver(false);
        let waiting = Message::new(trader, astropath, MessageKind::StatusUpdate, "b");
        let mut clean = Message::new(astropath, governor, MessageKind::UpgradeRequest, "a");
        clean.deliver(false);
        let mut warped = Message::new(astropath, trader, MessageKind::StatusUpdate, "c");
        warped.deliver(true);
        let mut other = Message::new(astropath, governor, MessageKind::UpgradeRequest, "d");
        other.deliver(false);

        let stats = AstropathStats::tally(astropath, &[relayed, waiting, clean, warped, other]);

        assert_eq!(stats.received, 2);
        assert_eq!(stats.relayed, 1);
        assert_eq!(stats.received_commands, 1);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.distorted, 1);
        assert_eq!(stats.delivery_rate, 50);
        assert_eq!(stats.distortion_rate, 33);
    }

    #[test]
    fn test_idle_astropath_has_zero_rates() {
        let stats = AstropathStats::tally(UserId::new(), &[]);
        assert_eq!(stats, AstropathStats::default());
    }
}
