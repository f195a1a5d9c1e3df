use crate::data::TickEvent;

/// Price tolerance when comparing the trade price against the quote.
const EPSILON: f64 = 1e-6;

/// Split a trade's volume into aggressive buy and sell quantities.
///
/// Cascade: quote spread first (trade at the ask lifted it, at the bid hit
/// it), then resting order-book pressure, then the day's price change. When
/// nothing signals, split evenly with the odd unit on the sell side. The
/// result is always two non-negative integers summing to `vol`.
pub fn aggressor_volumes(tick: &TickEvent, vol: i64) -> (i64, i64) {
    if vol <= 0 {
        return (0, 0);
    }

    let mut buy = 0i64;
    let mut sell = 0i64;

    if let (Some(bid), Some(ask), Some(ltp)) = (tick.bid_price, tick.ask_price, tick.ltp) {
        if ask >= bid {
            if ltp >= ask - EPSILON {
                buy = vol;
            } else if ltp <= bid + EPSILON {
                sell = vol;
            } else {
                // traded inside the spread
                (buy, sell) = book_pressure_split(tick, vol).unwrap_or_else(|| even_split(vol));
            }
        }
    }

    if buy + sell == 0 {
        if let Some(split) = book_pressure_split(tick, vol) {
            (buy, sell) = split;
        }
    }

    if buy + sell == 0 {
        match tick.ch {
            Some(ch) if ch > 0.0 => buy = vol,
            Some(ch) if ch < 0.0 => sell = vol,
            _ => (buy, sell) = even_split(vol),
        }
    }

    // push any rounding difference onto the dominant side
    let diff = vol - (buy + sell);
    if diff != 0 {
        if buy >= sell {
            buy += diff;
        } else {
            sell += diff;
        }
    }

    (buy.max(0), sell.max(0))
}

fn book_pressure_split(tick: &TickEvent, vol: i64) -> Option<(i64, i64)> {
    let total_bid = tick.tot_buy_qty?;
    let total_ask = tick.tot_sell_qty?;
    let pressure = total_bid + total_ask;
    if pressure <= 0 {
        return None;
    }
    let buy = (vol as f64 * total_bid as f64 / pressure as f64).round() as i64;
    Some((buy, vol - buy))
}

fn even_split(vol: i64) -> (i64, i64) {
    let buy = vol / 2;
    (buy, vol - buy)
}
