//! Prorated refund arithmetic for subscription cancellation.

use chrono::{Datelike, Duration, NaiveDate};

const DAYS_IN_WEEK: i64 = 7;
const DAYS_IN_MONTH: i64 = 30;

/// Refund owed when a subscription is canceled on `today`.
///
/// Within a week of the last renewal the full annual price comes back
/// (buyer's remorse). Inside the first month after expiry nothing comes
/// back. Otherwise whole already-paid months that have elapsed since the
/// renewal are bought back at the monthly rate.
///
/// Pure function of its inputs; the cancellation flow decides what to do
/// with the amount.
pub fn compute_refund(
    today: NaiveDate,
    end_of_subscription: NaiveDate,
    annual_price: i64,
    monthly_price: i64,
) -> i64 {
    let date_of_last_renewal = end_of_subscription
        .with_year(end_of_subscription.year() - 1)
        .unwrap_or(end_of_subscription - Duration::days(365));

    let days_since_renewal = (today - date_of_last_renewal).num_days();
    let days_since_expiry = (today - end_of_subscription).num_days();

    if days_since_renewal < DAYS_IN_WEEK {
        annual_price
    } else if (0..DAYS_IN_MONTH).contains(&days_since_expiry) {
        0
    } else {
        (days_since_renewal / DAYS_IN_MONTH) * monthly_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANNUAL: i64 = 1200;
    const MONTHLY: i64 = 100;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(offset)
    }

    #[test]
    fn full_refund_inside_the_first_week() {
        // activated on day 0, canceled on day 3
        assert_eq!(compute_refund(day(3), day(365), ANNUAL, MONTHLY), ANNUAL);
    }

    #[test]
    fn full_refund_window_closes_on_day_seven() {
        assert_eq!(compute_refund(day(6), day(365), ANNUAL, MONTHLY), ANNUAL);
        assert_eq!(compute_refund(day(7), day(365), ANNUAL, MONTHLY), 0);
    }

    #[test]
    fn whole_elapsed_months_refund_at_the_monthly_rate() {
        // canceled on day 40: floor(40 / 30) = 1 month
        assert_eq!(compute_refund(day(40), day(365), ANNUAL, MONTHLY), MONTHLY);
        // day 95: floor(95 / 30) = 3 months
        assert_eq!(
            compute_refund(day(95), day(365), ANNUAL, MONTHLY),
            3 * MONTHLY
        );
    }

    #[test]
    fn nothing_back_within_a_month_after_expiry() {
        assert_eq!(compute_refund(day(375), day(365), ANNUAL, MONTHLY), 0);
        assert_eq!(compute_refund(day(394), day(365), ANNUAL, MONTHLY), 0);
    }

    #[test]
    fn is_a_pure_function_of_its_inputs() {
        let first = compute_refund(day(40), day(365), ANNUAL, MONTHLY);
        let second = compute_refund(day(40), day(365), ANNUAL, MONTHLY);
        assert_eq!(first, second);
    }
}
