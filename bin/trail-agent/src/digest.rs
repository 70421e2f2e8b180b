//! Once-a-day summary of the previous local day's reports, mailed to the
//! admin address.

use std::time::Duration;

use actix_web::web;
use chrono::{Days, Local, NaiveDate, NaiveDateTime, NaiveTime};
use ta_api::AppState;
use ta_core::{clock, notices};

/// Time from `now` until the next `hour:00` local time.
pub fn delay_until(now: NaiveDateTime, hour: u32) -> Duration {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let mut next = now.date().and_time(at);
    if next <= now {
        next = next + Days::new(1);
    }
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

/// Sends the digest for the day before `today`. `false` when there was
/// nothing to report.
pub async fn send_digest(state: &AppState, today: NaiveDate) -> anyhow::Result<bool> {
    let from = today - Days::new(1);
    let rows = state
        .repo
        .digest_rows(clock::local_day_start(from), clock::local_day_start(today))
        .await?;
    let Some(notice) = notices::daily_digest(&state.config.admin_email, from, today, &rows) else {
        log::info!("digest: no reports on {from}");
        return Ok(false);
    };
    state.notifier.send(&notice).await?;
    log::info!("digest: {} trail(s) reported on {from}", rows.len());
    Ok(true)
}

pub fn spawn(state: web::Data<AppState>, hour: u32) {
    actix_web::rt::spawn(async move {
        loop {
            let wait = delay_until(Local::now().naive_local(), hour);
            log::debug!("digest: next run in {}s", wait.as_secs());
            tokio::time::sleep(wait).await;
            if let Err(e) = send_digest(&state, Local::now().date_naive()).await {
                log::error!("digest failed: {e:#}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 14)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn waits_for_later_today() {
        assert_eq!(delay_until(at(4, 30), 6), Duration::from_secs(90 * 60));
    }

    #[test]
    fn rolls_over_to_tomorrow() {
        assert_eq!(delay_until(at(6, 0), 6), Duration::from_secs(24 * 3600));
        assert_eq!(delay_until(at(23, 0), 6), Duration::from_secs(7 * 3600));
    }
}
