use jamsound::hal::{ChannelMapper, ChannelSelection, InputSource};

fn selection(input: [usize; 2], output: [usize; 2]) -> ChannelSelection {
    ChannelSelection { input, output }
}

#[test]
fn test_identity_stereo_routing() {
    let routing = ChannelMapper::routing(&ChannelSelection::default(), 2, 2).unwrap();

    let input = vec![1, 2, 3, 4];
    let mut stereo = vec![0; 4];
    routing.capture(&input, &mut stereo);
    assert_eq!(stereo, vec![1, 2, 3, 4]);

    let mut output = vec![0; 4];
    routing.render(&stereo, &mut output);
    assert_eq!(output, vec![1, 2, 3, 4]);
}

#[test]
fn test_swapped_inputs() {
    let routing = ChannelMapper::routing(&selection([1, 0], [0, 1]), 2, 2).unwrap();

    let mut stereo = vec![0; 2];
    routing.capture(&[10, 20], &mut stereo);
    assert_eq!(stereo, vec![20, 10]);
}

#[test]
fn test_four_channel_device_exposes_mixed_pairs() {
    assert_eq!(ChannelMapper::selectable_inputs(4), 8);
    assert_eq!(ChannelMapper::selectable_inputs(2), 2);
    assert_eq!(ChannelMapper::selectable_inputs(6), 6);

    assert_eq!(ChannelMapper::input_source(4, 4).unwrap(), InputSource::Mix(0, 2));
    assert_eq!(ChannelMapper::input_source(5, 4).unwrap(), InputSource::Mix(0, 3));
    assert_eq!(ChannelMapper::input_source(6, 4).unwrap(), InputSource::Mix(1, 2));
    assert_eq!(ChannelMapper::input_source(7, 4).unwrap(), InputSource::Mix(1, 3));
    assert!(ChannelMapper::input_source(8, 4).is_err());

    let names = ChannelMapper::input_channel_names(4);
    assert_eq!(names.len(), 8);
    assert_eq!(names[0], "Ch 1");
    assert_eq!(names[4], "Ch 1 + Ch 3");
    assert_eq!(names[7], "Ch 2 + Ch 4");
}

#[test]
fn test_mixed_input_saturates() {
    let routing = ChannelMapper::routing(&selection([4, 7], [0, 1]), 4, 2).unwrap();

    // one frame: ch0..ch3
    let input = vec![30000, 100, 10000, -50];
    let mut stereo = vec![0; 2];
    routing.capture(&input, &mut stereo);

    assert_eq!(stereo[0], i16::MAX);
    assert_eq!(stereo[1], 50);
}

#[test]
fn test_same_output_channel_writes_average() {
    let routing = ChannelMapper::routing(&selection([0, 1], [1, 1]), 2, 4).unwrap();

    let mut output = vec![99; 4];
    routing.render(&[100, 300], &mut output);
    assert_eq!(output, vec![0, 200, 0, 0]);
}

#[test]
fn test_unselected_outputs_are_silent() {
    let routing = ChannelMapper::routing(&selection([0, 1], [2, 3]), 2, 4).unwrap();

    let mut output = vec![7; 8];
    routing.render(&[1, 2, 3, 4], &mut output);
    assert_eq!(output, vec![0, 0, 1, 2, 0, 0, 3, 4]);
}

#[test]
fn test_normalize_replaces_out_of_range() {
    let normalized = ChannelMapper::normalize(selection([5, 9], [3, 7]), 2, 2);
    assert_eq!(normalized, selection([0, 1], [0, 1]));

    // mono device: right side falls back to channel 0 as well
    let mono = ChannelMapper::normalize(selection([0, 1], [0, 1]), 1, 1);
    assert_eq!(mono, selection([0, 0], [0, 0]));

    // mixed pairs stay valid on four-input devices
    let mixed = ChannelMapper::normalize(selection([6, 7], [0, 1]), 4, 2);
    assert_eq!(mixed, selection([6, 7], [0, 1]));
}

#[test]
fn test_output_only_device_captures_silence() {
    let routing = ChannelMapper::routing(&ChannelSelection::default(), 0, 2).unwrap();

    let mut stereo = vec![5; 4];
    routing.capture(&[], &mut stereo);
    assert_eq!(stereo, vec![0; 4]);
}

#[test]
fn test_routing_rejects_invalid_output() {
    assert!(ChannelMapper::routing(&selection([0, 1], [0, 2]), 2, 2).is_err());
}
