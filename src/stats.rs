//! Bot statistics and feature status shown on the dashboard home page.

use crate::data::Data;
use chrono::Utc;
use poise::serenity_prelude::GuildId;
use serde::Serialize;
use tracing::debug;

/// Guild summary inside [`BotStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildStats {
    pub id: String,
    pub name: String,
    pub member_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStats {
    pub online: bool,
    /// Gateway latency in ms
    pub ping: u64,
    /// Milliseconds since start
    pub uptime: u64,
    /// One minute load average, in percent of one core
    pub cpu: f64,
    /// Resident memory in MB
    pub ram: f64,
    pub guild: Option<GuildStats>,
}

impl BotStats {
    /// Stats reported while the bot is not connected
    #[must_use]
    pub fn offline() -> Self {
        Self {
            online: false,
            ping: 0,
            uptime: 0,
            cpu: 0.0,
            ram: 0.0,
            guild: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub punishments_enabled: bool,
    pub disputes_enabled: bool,
    pub verify_enabled: bool,
    pub temp_voice_enabled: bool,
}

impl Data {
    pub async fn bot_stats(&self, guild: Option<GuildId>) -> BotStats {
        let Some(platform) = self.platform() else {
            return BotStats::offline();
        };

        let guild = match guild {
            Some(id) => match platform.guild_summary(id).await {
                Ok(summary) => summary.map(|g| GuildStats {
                    id: g.id.to_string(),
                    name: g.name,
                    member_count: g.member_count,
                }),
                Err(e) => {
                    debug!("Could not fetch guild {id} for stats: {e}");
                    None
                }
            },
            None => None,
        };

        let uptime = (Utc::now() - self.started_at).num_milliseconds();
        BotStats {
            online: true,
            ping: self.gateway_latency_ms().await,
            uptime: u64::try_from(uptime).unwrap_or_default(),
            cpu: load_average().await,
            ram: resident_memory_mb().await,
            guild,
        }
    }

    pub async fn system_status(&self, guild: GuildId) -> SystemStatus {
        let settings = self.settings(guild).await;
        SystemStatus {
            punishments_enabled: settings.punishments_enabled,
            disputes_enabled: settings.disputes_enabled,
            verify_enabled: settings.verify_enabled,
            temp_voice_enabled: settings.temp_voice_enabled,
        }
    }

    /// Latency of the first shard that has reported one
    async fn gateway_latency_ms(&self) -> u64 {
        let Some(manager) = self.shard_manager() else {
            return 0;
        };
        let runners = manager.runners.lock().await;
        runners
            .values()
            .find_map(|runner| runner.latency)
            .map_or(0, |latency| {
                u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)
            })
    }
}

/// One minute load average from procfs; 0 where unavailable
async fn load_average() -> f64 {
    tokio::fs::read_to_string("/proc/loadavg")
        .await
        .ok()
        .and_then(|raw| parse_load_average(&raw))
        .map_or(0.0, |load| round2(load * 100.0))
}

/// Resident set size from procfs; 0 where unavailable
#[allow(clippy::cast_precision_loss)]
async fn resident_memory_mb() -> f64 {
    tokio::fs::read_to_string("/proc/self/status")
        .await
        .ok()
        .and_then(|raw| parse_vm_rss_kb(&raw))
        .map_or(0.0, |kb| round2(kb as f64 / 1024.0))
}

fn parse_load_average(raw: &str) -> Option<f64> {
    raw.split_whitespace().next()?.parse().ok()
}

fn parse_vm_rss_kb(raw: &str) -> Option<u64> {
    raw.lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{GuildSummary, MockPlatform};
    use std::sync::Arc;

    #[test]
    fn test_procfs_parsing() {
        assert_eq!(parse_load_average("0.52 0.58 0.59 1/467 12345\n"), Some(0.52));
        assert_eq!(parse_load_average(""), None);

        let status = "Name:\tvoice-warden\nVmPeak:\t  20000 kB\nVmRSS:\t   10240 kB\n";
        assert_eq!(parse_vm_rss_kb(status), Some(10240));
        assert_eq!(parse_vm_rss_kb("Name:\tx\n"), None);
        assert!((round2(1.23456) - 1.23).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_offline_without_platform() {
        let data = Data::new();
        assert_eq!(data.bot_stats(Some(GuildId::new(1))).await, BotStats::offline());
    }

    #[tokio::test]
    async fn test_online_stats() {
        let mut platform = MockPlatform::new();
        platform.expect_guild_summary().returning(|id| {
            Ok(Some(GuildSummary {
                id,
                name: "Warden HQ".to_string(),
                member_count: 12,
            }))
        });
        let data = Data::new();
        data.set_platform(Arc::new(platform));

        let stats = data.bot_stats(Some(GuildId::new(3))).await;
        assert!(stats.online);
        assert_eq!(stats.ping, 0);
        let guild = stats.guild.unwrap();
        assert_eq!(guild.id, "3");
        assert_eq!(guild.member_count, 12);

        let json = serde_json::to_value(data.bot_stats(None).await).unwrap();
        assert!(json.get("uptime").is_some());
        assert!(json["guild"].is_null());
    }

    #[tokio::test]
    async fn test_system_status() {
        let data = Data::new();
        let guild = GuildId::new(1);
        data.update_settings(guild, None, |s| s.disputes_enabled = false)
            .await
            .unwrap();
        let status = data.system_status(guild).await;
        assert!(status.punishments_enabled);
        assert!(!status.disputes_enabled);
        assert!(status.verify_enabled);
        assert!(!status.temp_voice_enabled);
    }
}
