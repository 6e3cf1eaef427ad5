//! Oodle-1 decompression for Granny2 sectors
//!
//! Oodle-1 is an adaptive arithmetic coder over a growing symbol
//! alphabet. A compressed sector payload starts with three parameter
//! records; the two stop offsets from the sector descriptor split the
//! decompressed output into three ranges, each decoded with its own
//! parameter record and a freshly initialised dictionary over a single
//! shared bit stream.
//!
//! The dictionary drives five window groups (literal windows per output
//! alignment, back-reference low/mid/high component windows, and one
//! length window per previous length symbol); each window is an adaptive
//! frequency model whose cumulative ranges span `[0, 0x4000]`.

use crate::error::{Error, Result};

// ============================================================================
// Parameter records
// ============================================================================

/// Record stride inside the parameter block.
const PARAMETER_LEN: usize = 16;

/// Three records precede the bit stream.
const PARAMETER_BLOCK_LEN: usize = 3 * PARAMETER_LEN;

/// Per-range decoder parameters.
///
/// The first 8 bytes are an LSB-first bitfield; the fields are extracted
/// by explicit masking so the layout never depends on the host.
#[derive(Debug, Clone, Copy)]
struct Parameter {
    decoded_value_max: u32,
    backref_value_max: u32,
    decoded_count: u16,
    highbit_count: u16,
    sizes_count: [u8; 4],
}

impl Parameter {
    fn parse(record: &[u8; PARAMETER_LEN]) -> Self {
        let bits = u64::from_le_bytes(record[0..8].try_into().unwrap_or([0; 8]));

        Self {
            decoded_value_max: (bits & 0x1FF) as u32,
            backref_value_max: ((bits >> 9) & 0x7F_FFFF) as u32,
            decoded_count: ((bits >> 32) & 0x1FF) as u16,
            // bits 41..51 are padding
            highbit_count: ((bits >> 51) & 0x1FFF) as u16,
            sizes_count: [record[8], record[9], record[10], record[11]],
        }
    }
}

// ============================================================================
// Arithmetic decoder
// ============================================================================

/// Arithmetic decoder state over the sector bit stream.
///
/// Bits arrive 7 at a time straddling byte boundaries: each refill takes
/// the top bit of the current byte and the low seven bits of the next,
/// consuming one input byte. Reads past the end of the stream see zeros
/// (the caller zero-pads the compressed buffer).
struct Decoder<'a> {
    numer: u32,
    denom: u32,
    next_denom: u32,
    stream: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(stream: &'a [u8]) -> Self {
        Self {
            numer: u32::from(stream.first().copied().unwrap_or(0) >> 1),
            denom: 0x80,
            next_denom: 0,
            stream,
            pos: 0,
        }
    }

    fn byte(&self, pos: usize) -> u8 {
        self.stream.get(pos).copied().unwrap_or(0)
    }

    /// Draw a value in `[0, max)` without consuming it from the interval.
    fn decode(&mut self, max: u16) -> Result<u16> {
        if max == 0 {
            return Err(Error::Decompression(
                "arithmetic decoder drawn with empty alphabet".to_string(),
            ));
        }

        while self.denom <= 0x0080_0000 {
            self.numer = self.numer.wrapping_shl(8);
            self.numer |= (u32::from(self.byte(self.pos)) << 7) & 0x80;
            self.numer |= (u32::from(self.byte(self.pos + 1)) >> 1) & 0x7F;
            self.pos += 1;
            self.denom <<= 8;
        }

        self.next_denom = self.denom / u32::from(max);
        Ok((self.numer / self.next_denom).min(u32::from(max) - 1) as u16)
    }

    /// Narrow the interval to the drawn value's sub-range.
    fn commit(&mut self, max: u16, val: u16, err: u16) {
        self.numer = self
            .numer
            .wrapping_sub(self.next_denom.wrapping_mul(u32::from(val)));

        if val + err < max {
            self.denom = self.next_denom.wrapping_mul(u32::from(err));
        } else {
            self.denom = self
                .denom
                .wrapping_sub(self.next_denom.wrapping_mul(u32::from(val)));
        }
    }

    fn decode_commit(&mut self, max: u16) -> Result<u16> {
        let val = self.decode(max)?;
        self.commit(max, val, 1);
        Ok(val)
    }
}

// ============================================================================
// Weighted symbol window
// ============================================================================

/// Slot marker returned by [`WeightWindow::try_decode`] when a fresh
/// symbol was promoted: the caller draws the true value directly from
/// the stream and writes it into that slot.
type NewSlot = Option<usize>;

/// Adaptive frequency model over a growing symbol alphabet.
///
/// `ranges` holds cumulative 14-bit cut-points over the current weights;
/// it is rebuilt lazily once `weight_total` passes `thresh_range_rebuild`,
/// and the weights themselves decay (halve, compact, re-floor) once the
/// rebuild threshold passes `thresh_weight_rebuild`.
struct WeightWindow {
    count_cap: u16,
    ranges: Vec<u16>,
    values: Vec<u16>,
    weights: Vec<u16>,
    weight_total: u16,
    thresh_increase: u16,
    thresh_increase_cap: u16,
    thresh_range_rebuild: u16,
    thresh_weight_rebuild: u16,
}

impl WeightWindow {
    fn new(max_value: u32, count_cap: u16) -> Self {
        let thresh_weight_rebuild = 256u32.max(max_value.wrapping_mul(32).min(15160)) as u16;
        let thresh_increase_cap = if max_value > 64 {
            max_value
                .wrapping_mul(2)
                .min(u32::from(thresh_weight_rebuild) / 2 - 32) as u16
        } else {
            128
        };

        Self {
            count_cap: count_cap + 1,
            ranges: vec![0, 0x4000],
            values: vec![0],
            weights: vec![4],
            weight_total: 4,
            thresh_increase: 4,
            thresh_increase_cap,
            thresh_range_rebuild: 8,
            thresh_weight_rebuild,
        }
    }

    fn rebuild_ranges(&mut self) -> Result<()> {
        if self.weight_total == 0 {
            return Err(Error::Decompression(
                "symbol window weights exhausted".to_string(),
            ));
        }

        self.ranges.resize(self.weights.len() + 1, 0);

        let range_weight = 8 * 0x4000 / u32::from(self.weight_total);
        let mut range_start = 0u16;
        for (i, &weight) in self.weights.iter().enumerate() {
            self.ranges[i] = range_start;
            range_start =
                range_start.wrapping_add((u32::from(weight) * range_weight / 8) as u16);
        }
        let last = self.ranges.len() - 1;
        self.ranges[last] = 0x4000;

        if self.thresh_increase > self.thresh_increase_cap / 2 {
            self.thresh_range_rebuild = self.weight_total + self.thresh_increase_cap;
        } else {
            self.thresh_increase *= 2;
            self.thresh_range_rebuild = self.weight_total + self.thresh_increase;
        }

        Ok(())
    }

    fn rebuild_weights(&mut self) {
        let mut total = 0u16;
        for weight in &mut self.weights {
            *weight /= 2;
            total += *weight;
        }
        self.weight_total = total;

        // Compact dead slots by swapping the tail in; slot 0 (the escape)
        // always stays.
        let mut i = 1;
        while i < self.weights.len() {
            while i < self.weights.len() && self.weights[i] == 0 {
                let last = self.weights.len() - 1;
                self.weights[i] = self.weights[last];
                self.values[i] = self.values[last];
                self.weights.pop();
                self.values.pop();
            }
            i += 1;
        }

        // Keep the heaviest non-escape symbol in the tail slot.
        if self.weights.len() > 1 {
            let mut max_index = 1;
            let mut max_weight = 0;
            for (j, &weight) in self.weights.iter().enumerate().skip(1) {
                if weight > max_weight {
                    max_weight = weight;
                    max_index = j;
                }
            }
            let last = self.weights.len() - 1;
            self.weights.swap(max_index, last);
            self.values.swap(max_index, last);
        }

        if self.weights.len() < usize::from(self.count_cap) && self.weights[0] == 0 {
            self.weights[0] = 1;
            self.weight_total += 1;
        }
    }

    /// Decode one symbol. Returns the decoded value and, for a freshly
    /// promoted symbol, the slot the caller must fill with the true value.
    fn try_decode(&mut self, decoder: &mut Decoder<'_>) -> Result<(NewSlot, u16)> {
        if self.weight_total >= self.thresh_range_rebuild {
            if self.thresh_range_rebuild >= self.thresh_weight_rebuild {
                self.rebuild_weights();
            }
            self.rebuild_ranges()?;
        }

        let value = decoder.decode(0x4000)?;

        let mut slot = self.ranges.len() - 1;
        for (i, &cut) in self.ranges.iter().enumerate() {
            if cut > value {
                slot = i;
                break;
            }
        }
        if slot == 0 {
            // ranges[0] is always 0, so this interval cannot contain any
            // drawn value
            return Err(Error::Decompression(
                "symbol draw landed outside every range".to_string(),
            ));
        }
        slot -= 1;

        decoder.commit(0x4000, self.ranges[slot], self.ranges[slot + 1] - self.ranges[slot]);

        self.weights[slot] += 1;
        self.weight_total += 1;

        if slot > 0 {
            return Ok((None, self.values[slot]));
        }

        // Escape: either revisit a symbol not yet promoted into the
        // ranges, or grow the alphabet by one placeholder slot.
        if self.weights.len() >= self.ranges.len() && decoder.decode_commit(2)? == 1 {
            let unsorted = (self.weights.len() - self.ranges.len() + 1) as u16;
            let index = self.ranges.len() + usize::from(decoder.decode_commit(unsorted)?) - 1;

            self.weights[index] += 2;
            self.weight_total += 2;
            return Ok((None, self.values[index]));
        }

        self.values.push(0);
        self.weights.push(2);
        self.weight_total += 2;

        if self.weights.len() == usize::from(self.count_cap) {
            self.weight_total -= self.weights[0];
            self.weights[0] = 0;
        }

        Ok((Some(self.values.len() - 1), 0))
    }
}

// ============================================================================
// Dictionary
// ============================================================================

/// Length symbols 61..=64 map to extended back-reference sizes.
const EXTENDED_SIZES: [u32; 4] = [128, 192, 256, 512];

/// One dictionary per decoded range: literal windows keyed by output
/// alignment, back-reference component windows, and 65 length windows
/// keyed by the previous length symbol.
struct Dictionary {
    decoded_size: u32,
    backref_size: u32,

    decoded_value_max: u32,
    backref_value_max: u32,
    lowbit_value_max: u32,

    lowbit_window: WeightWindow,
    highbit_window: WeightWindow,
    midbit_windows: Vec<WeightWindow>,
    decoded_windows: Vec<WeightWindow>,
    size_windows: Vec<WeightWindow>,
}

impl Dictionary {
    fn new(param: &Parameter) -> Self {
        let decoded_value_max = param.decoded_value_max;
        let backref_value_max = param.backref_value_max;
        let lowbit_value_max = (backref_value_max + 1).min(4);
        let midbit_value_max = (backref_value_max / 4 + 1).min(256);
        let highbit_value_max = backref_value_max / 1024 + 1;

        let midbit_windows = (0..highbit_value_max)
            .map(|_| WeightWindow::new(midbit_value_max - 1, midbit_value_max as u16))
            .collect();

        let decoded_windows = (0..4)
            .map(|_| WeightWindow::new(decoded_value_max.wrapping_sub(1), param.decoded_count))
            .collect();

        // 4 groups of 16 length windows keyed by sizes_count[3], [2],
        // [1], [0], plus the final window for length symbol 64.
        let mut size_windows = Vec::with_capacity(4 * 16 + 1);
        for i in 0..4 {
            for _ in 0..16 {
                size_windows.push(WeightWindow::new(
                    64,
                    u16::from(param.sizes_count[3 - i]),
                ));
            }
        }
        size_windows.push(WeightWindow::new(64, u16::from(param.sizes_count[0])));

        Self {
            decoded_size: 0,
            backref_size: 0,
            decoded_value_max,
            backref_value_max,
            lowbit_value_max,
            lowbit_window: WeightWindow::new(lowbit_value_max - 1, lowbit_value_max as u16),
            highbit_window: WeightWindow::new(
                backref_value_max / 1024,
                param.highbit_count + 1,
            ),
            midbit_windows,
            decoded_windows,
            size_windows,
        }
    }

    /// Decode one block: either a back-reference copy (returns its size)
    /// or a single literal byte (returns 1).
    fn decompress_block(&mut self, decoder: &mut Decoder<'_>, out: &mut Vec<u8>) -> Result<u32> {
        let length_window = &mut self.size_windows[self.backref_size as usize];
        let (new_slot, mut length_symbol) = length_window.try_decode(decoder)?;
        if let Some(slot) = new_slot {
            length_symbol = decoder.decode_commit(65)?;
            length_window.values[slot] = length_symbol;
        }
        self.backref_size = u32::from(length_symbol);

        if self.backref_size > 0 {
            let backref_size = if self.backref_size < 61 {
                self.backref_size + 1
            } else {
                EXTENDED_SIZES[(self.backref_size - 61) as usize]
            };
            let backref_range = self.backref_value_max.min(self.decoded_size);

            let (new_slot, mut low) = self.lowbit_window.try_decode(decoder)?;
            if let Some(slot) = new_slot {
                low = decoder.decode_commit(self.lowbit_value_max as u16)?;
                self.lowbit_window.values[slot] = low;
            }

            let (new_slot, mut high) = self.highbit_window.try_decode(decoder)?;
            if let Some(slot) = new_slot {
                high = decoder.decode_commit((backref_range / 1024 + 1) as u16)?;
                self.highbit_window.values[slot] = high;
            }

            let midbit_window =
                self.midbit_windows
                    .get_mut(high as usize)
                    .ok_or_else(|| {
                        Error::Decompression(format!(
                            "back-reference high component {high} out of range"
                        ))
                    })?;
            let (new_slot, mut mid) = midbit_window.try_decode(decoder)?;
            if let Some(slot) = new_slot {
                mid = decoder.decode_commit((backref_range / 4 + 1).min(256) as u16)?;
                midbit_window.values[slot] = mid;
            }

            let offset =
                ((u32::from(high) << 10) + (u32::from(mid) << 2) + u32::from(low) + 1) as usize;

            copy_backref(out, offset, backref_size as usize)?;
            self.decoded_size += backref_size;
            return Ok(backref_size);
        }

        let alignment = out.len() % 4;
        let literal_window = &mut self.decoded_windows[alignment];
        let (new_slot, mut value) = literal_window.try_decode(decoder)?;
        if let Some(slot) = new_slot {
            value = decoder.decode_commit(self.decoded_value_max as u16)?;
            literal_window.values[slot] = value;
        }

        out.push((value & 0xFF) as u8);
        self.decoded_size += 1;
        Ok(1)
    }
}

/// Append `len` bytes copied from `offset` bytes back in the output.
/// Offsets smaller than the copy length replicate the source window,
/// as in LZ77 overlap copies.
fn copy_backref(out: &mut Vec<u8>, offset: usize, len: usize) -> Result<()> {
    let pos = out.len();
    if offset == 0 || offset > pos {
        return Err(Error::Decompression(format!(
            "back-reference offset {offset} outside the {pos} bytes emitted"
        )));
    }

    for i in 0..len {
        out.push(out[pos - offset + i % offset]);
    }
    Ok(())
}

// ============================================================================
// Sector decompression
// ============================================================================

/// Decompress an Oodle-1 sector payload.
///
/// `stop0` and `stop1` partition the output into the three ranges decoded
/// with the three parameter records. A zero-length payload is a valid
/// encoding of `expected_size` zero bytes.
///
/// # Errors
/// Returns an error if the stops are inconsistent or the bit stream
/// derails.
pub fn decompress(
    compressed: &[u8],
    expected_size: usize,
    stop0: u32,
    stop1: u32,
) -> Result<Vec<u8>> {
    if compressed.is_empty() {
        return Ok(vec![0u8; expected_size]);
    }

    if compressed.len() < PARAMETER_BLOCK_LEN {
        return Err(Error::Decompression(format!(
            "parameter block truncated: {} bytes",
            compressed.len()
        )));
    }

    let stops = [stop0 as usize, stop1 as usize, expected_size];
    if stops[0] > stops[1] || stops[1] > expected_size {
        return Err(Error::Decompression(format!(
            "stop offsets {stop0}/{stop1} inconsistent with output size {expected_size}"
        )));
    }

    let parameters: Vec<Parameter> = (0..3)
        .map(|i| {
            let record: [u8; PARAMETER_LEN] = compressed
                [i * PARAMETER_LEN..(i + 1) * PARAMETER_LEN]
                .try_into()
                .unwrap_or([0; PARAMETER_LEN]);
            Parameter::parse(&record)
        })
        .collect();

    let mut decoder = Decoder::new(&compressed[PARAMETER_BLOCK_LEN..]);
    let mut out = Vec::with_capacity(expected_size);

    for (param, &stop) in parameters.iter().zip(&stops) {
        let mut dictionary = Dictionary::new(param);
        while out.len() < stop {
            dictionary.decompress_block(&mut decoder, &mut out)?;
        }
    }

    if out.len() != expected_size {
        return Err(Error::Decompression(format!(
            "decompressed {} bytes, expected {expected_size}",
            out.len()
        )));
    }

    Ok(out)
}
