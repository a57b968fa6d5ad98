// Projected prize money from a leaderboard position.

/// Share of the purse paid to finishing positions 1 through 65.
const PAYOUT_PERCENTAGES: [f64; 65] = [
    0.1800, 0.1090, 0.0690, 0.0490, 0.0410, // 1-5
    0.0363, 0.0338, 0.0313, 0.0293, 0.0273, // 6-10
    0.0253, 0.0233, 0.0213, 0.0193, 0.0183, // 11-15
    0.0173, 0.0163, 0.0153, 0.0143, 0.0133, // 16-20
    0.0123, 0.0113, 0.0105, 0.0097, 0.0089, // 21-25
    0.0081, 0.0078, 0.0075, 0.0072, 0.0069, // 26-30
    0.0066, 0.0063, 0.0060, 0.0057, 0.0055, // 31-35
    0.0052, 0.0050, 0.0048, 0.0046, 0.0044, // 36-40
    0.0042, 0.0040, 0.0038, 0.0036, 0.0034, // 41-45
    0.0032, 0.0030, 0.0028, 0.0027, 0.0026, // 46-50
    0.0025, 0.0025, 0.0024, 0.0024, 0.0024, // 51-55
    0.0023, 0.0023, 0.0023, 0.0023, 0.0023, // 56-60
    0.0022, 0.0022, 0.0022, 0.0022, 0.0022, // 61-65
];

/// Lowest rank that still projects any prize money.
pub const LAST_PAYING_RANK: u32 = 80;

const NON_PAYING_MARKERS: [&str; 5] = ["CUT", "WD", "DQ", "-", ""];

/// Share of the purse for a single rank.
pub fn rank_percentage(rank: u32) -> f64 {
    match rank {
        1..=65 => PAYOUT_PERCENTAGES[(rank - 1) as usize],
        66..=LAST_PAYING_RANK => (0.00213 - f64::from(rank - 66) * 0.00002).max(0.0),
        _ => 0.0,
    }
}

/// Parse `"5"` or `"T5"` (any case) into the rank it starts at.
pub fn parse_rank(position: &str) -> Option<u32> {
    let upper = position.trim().to_uppercase();
    let digits = upper.strip_prefix('T').unwrap_or(&upper);
    digits.parse().ok()
}

/// Projected earnings for `position` given the full leaderboard's position
/// strings. Golfers tied at a position split the combined payout of the
/// ranks they occupy.
///
/// ```
/// use fairway_core::payout::projected_earnings;
///
/// let board = ["1", "T2", "T2", "T2", "5"];
/// assert_eq!(projected_earnings("1", 1_000_000, &board), 180_000);
/// ```
pub fn projected_earnings<S: AsRef<str>>(position: &str, purse: i64, all_positions: &[S]) -> i64 {
    let upper = position.trim().to_uppercase();
    if NON_PAYING_MARKERS.contains(&upper.as_str()) || purse <= 0 {
        return 0;
    }
    let Some(rank) = parse_rank(&upper) else {
        return 0;
    };
    if rank == 0 || rank > LAST_PAYING_RANK {
        return 0;
    }

    let tie_count = all_positions
        .iter()
        .filter(|p| p.as_ref().trim().to_uppercase() == upper)
        .count()
        .max(1);

    let mut total = 0.0;
    for offset in 0..tie_count as u32 {
        total += rank_percentage(rank + offset);
    }
    let share = total / tie_count as f64;

    (purse as f64 * share) as i64
}
