use anyhow::Result;
use super::types::ChannelSelection;

/// Where one side of the stereo buffer takes its samples from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Single(usize),
    /// Saturating sum of two device channels
    Mix(usize, usize),
}

/// Resolved routing between device channels and the stereo sample buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRouting {
    pub inputs: [InputSource; 2],
    pub outputs: [usize; 2],
    pub input_channels: usize,
    pub output_channels: usize,
}

pub struct ChannelMapper;

impl ChannelMapper {
    /// Number of selectable input indices for a device with `available` inputs.
    ///
    /// Four-input devices expose four extra mixed pairs (0+2, 0+3, 1+2, 1+3).
    pub fn selectable_inputs(available: usize) -> usize {
        if available == 4 {
            8
        } else {
            available
        }
    }

    /// Resolve a selectable input index into device channels
    pub fn input_source(selected: usize, available: usize) -> Result<InputSource> {
        if selected >= Self::selectable_inputs(available) {
            anyhow::bail!(
                "Input channel {} out of range (0..{})",
                selected,
                Self::selectable_inputs(available)
            );
        }

        if selected >= available {
            let offset = selected - available;
            return Ok(InputSource::Mix(offset / 2, offset % 2 + 2));
        }

        Ok(InputSource::Single(selected))
    }

    pub fn input_channel_names(available: usize) -> Vec<String> {
        (0..Self::selectable_inputs(available))
            .map(|sel| match Self::input_source(sel, available) {
                Ok(InputSource::Mix(a, b)) => format!("Ch {} + Ch {}", a + 1, b + 1),
                _ => format!("Ch {}", sel + 1),
            })
            .collect()
    }

    pub fn output_channel_names(available: usize) -> Vec<String> {
        (0..available).map(|ch| format!("Ch {}", ch + 1)).collect()
    }

    /// Replace out-of-range selections with the default left/right pair
    pub fn normalize(
        selection: ChannelSelection,
        input_channels: usize,
        output_channels: usize,
    ) -> ChannelSelection {
        ChannelSelection {
            input: Self::normalize_pair(selection.input, Self::selectable_inputs(input_channels)),
            output: Self::normalize_pair(selection.output, output_channels),
        }
    }

    fn normalize_pair(pair: [usize; 2], available: usize) -> [usize; 2] {
        let default_right = if available > 1 { 1 } else { 0 };
        [
            if pair[0] < available { pair[0] } else { 0 },
            if pair[1] < available { pair[1] } else { default_right },
        ]
    }

    /// Build routing for a normalized selection
    pub fn routing(
        selection: &ChannelSelection,
        input_channels: usize,
        output_channels: usize,
    ) -> Result<ChannelRouting> {
        let inputs = if input_channels == 0 {
            [InputSource::Single(0); 2]
        } else {
            [
                Self::input_source(selection.input[0], input_channels)?,
                Self::input_source(selection.input[1], input_channels)?,
            ]
        };

        for &ch in &selection.output {
            if output_channels > 0 && ch >= output_channels {
                anyhow::bail!("Output channel {} out of range (0..{})", ch, output_channels);
            }
        }

        Ok(ChannelRouting {
            inputs,
            outputs: selection.output,
            input_channels,
            output_channels,
        })
    }
}

impl ChannelRouting {
    /// Fill the interleaved stereo buffer from interleaved device input
    pub fn capture(&self, input: &[i16], stereo: &mut [i16]) {
        if self.input_channels == 0 {
            stereo.fill(0);
            return;
        }

        for (frame, out) in input
            .chunks_exact(self.input_channels)
            .zip(stereo.chunks_exact_mut(2))
        {
            for (side, source) in self.inputs.iter().enumerate() {
                out[side] = match *source {
                    InputSource::Single(ch) => frame[ch],
                    InputSource::Mix(a, b) => frame[a].saturating_add(frame[b]),
                };
            }
        }
    }

    /// Write the stereo buffer to interleaved device output; unselected channels get silence
    pub fn render(&self, stereo: &[i16], output: &mut [i16]) {
        if self.output_channels == 0 {
            return;
        }

        let [left, right] = self.outputs;
        for (frame, pair) in output
            .chunks_exact_mut(self.output_channels)
            .zip(stereo.chunks_exact(2))
        {
            frame.fill(0);
            if left == right {
                frame[left] = ((pair[0] as i32 + pair[1] as i32) / 2) as i16;
            } else {
                frame[left] = pair[0];
                frame[right] = pair[1];
            }
        }
    }
}
