//! Graph evaluation through the public API.

use prism_core::{
    AbyssPolicy, BlitFlags, Buffer, CancelToken, Colour, ConnectionError, Engine, EngineConfig,
    Graph, NodeId, NodeSpec, NodeState, PrismError, Rect,
};

const EPSILON: f32 = 1e-4;

fn rgba() -> prism_core::PixelFormat {
    prism_color::format("RGBA float").unwrap()
}

fn engine(threads: usize, cache: bool) -> Engine {
    Engine::with_config(EngineConfig {
        tile_width: 16,
        tile_height: 16,
        threads,
        cache,
    })
    .unwrap()
}

fn pixel(buffer: &Buffer, x: i32, y: i32) -> [f32; 4] {
    let bytes = buffer
        .get(Rect::new(x, y, 1, 1), 1.0, &rgba(), AbyssPolicy::None)
        .unwrap();
    let mut out = [0.0; 4];
    for (slot, c) in out.iter_mut().zip(bytes.chunks_exact(4)) {
        *slot = f32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
    }
    out
}

fn assert_pixel(got: [f32; 4], want: [f32; 4]) {
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < EPSILON, "got {got:?}, want {want:?}");
    }
}

/// Blue background with a red square at (10, 10, 10, 10) composited over it.
fn scene(graph: &mut Graph) -> (NodeId, NodeId, NodeId) {
    let bg = graph
        .create_node(NodeSpec::new("prism:color").with("value", Colour::new(0.0, 0.0, 1.0, 1.0)))
        .unwrap();
    let fg = graph
        .create_node(
            NodeSpec::new("prism:rectangle")
                .with("x", 10.0)
                .with("y", 10.0)
                .with("width", 10.0)
                .with("height", 10.0)
                .with("color", Colour::new(1.0, 0.0, 0.0, 1.0)),
        )
        .unwrap();
    let over = graph.create_node(NodeSpec::new("prism:over")).unwrap();
    graph.connect(bg, "output", over, "input").unwrap();
    graph.connect(fg, "output", over, "aux").unwrap();
    (bg, fg, over)
}

#[test]
fn test_render_composites_over() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let out = engine(1, true)
        .render(&graph, over, Rect::new(0, 0, 32, 32), None)
        .unwrap();
    assert_eq!(out.extent(), Rect::new(0, 0, 32, 32));
    assert_pixel(pixel(&out, 15, 15), [1.0, 0.0, 0.0, 1.0]);
    assert_pixel(pixel(&out, 2, 2), [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn test_render_outside_bbox_is_transparent() {
    let mut graph = Graph::new();
    let rect = graph
        .create_node(
            NodeSpec::new("prism:rectangle")
                .with("width", 4.0)
                .with("height", 4.0)
                .with("color", Colour::WHITE),
        )
        .unwrap();
    let out = engine(1, true)
        .render(&graph, rect, Rect::new(0, 0, 8, 8), None)
        .unwrap();
    assert_pixel(pixel(&out, 1, 1), [1.0, 1.0, 1.0, 1.0]);
    assert_pixel(pixel(&out, 6, 6), [0.0; 4]);
}

#[test]
fn test_invalidation_leaves_cache_minus_rect() {
    let mut graph = Graph::new();
    let source = graph
        .create_node(NodeSpec::new("prism:color").with("value", Colour::WHITE))
        .unwrap();
    let nop = graph.create_node(NodeSpec::new("prism:nop")).unwrap();
    graph.link(&[source, nop]).unwrap();

    let roi = Rect::new(0, 0, 16, 16);
    engine(1, true).render(&graph, nop, roi, None).unwrap();
    assert_eq!(graph.cached_region(nop).unwrap().area(), roi.area());
    assert_eq!(graph.state(nop).unwrap(), NodeState::Processed);

    let hole = Rect::new(4, 4, 4, 4);
    graph.invalidate(source, hole).unwrap();
    let cached = graph.cached_region(nop).unwrap();
    assert_eq!(cached.area(), roi.area() - hole.area());
    assert!(cached.contains(&Rect::new(0, 0, 16, 4)));
    assert!(!cached.missing(&roi).rects().is_empty());
    assert_eq!(cached.missing(&roi).area(), hole.area());
    assert_eq!(graph.state(nop).unwrap(), NodeState::Invalidated);
}

#[test]
fn test_property_change_recomputes() {
    let mut graph = Graph::new();
    let source = graph
        .create_node(NodeSpec::new("prism:color").with("value", Colour::WHITE))
        .unwrap();
    let engine = engine(1, true);
    let roi = Rect::new(0, 0, 4, 4);
    engine.render(&graph, source, roi, None).unwrap();

    graph.set_property(source, "value", Colour::BLACK).unwrap();
    assert!(graph.cached_region(source).unwrap().is_empty());
    let out = engine.render(&graph, source, roi, None).unwrap();
    assert_pixel(pixel(&out, 0, 0), [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_two_cycle_leaves_graph_unchanged() {
    let mut graph = Graph::new();
    let a = graph.create_node(NodeSpec::new("prism:nop")).unwrap();
    let b = graph.create_node(NodeSpec::new("prism:nop")).unwrap();
    graph.connect(a, "output", b, "input").unwrap();

    let err = graph.connect(b, "output", a, "input").unwrap_err();
    assert!(matches!(err, PrismError::Connection(ConnectionError::Cycle { .. })));
    assert!(graph.producer(a, "input").unwrap().is_none());
    assert!(graph.consumers(b, "output").unwrap().is_empty());
    assert_eq!(graph.producer(b, "input").unwrap().map(|e| e.node), Some(a));
}

#[test]
fn test_missing_input_is_graph_error() {
    let mut graph = Graph::new();
    let nop = graph.create_node(NodeSpec::new("prism:nop")).unwrap();
    let err = engine(1, true)
        .render(&graph, nop, Rect::new(0, 0, 2, 2), None)
        .unwrap_err();
    assert!(matches!(err, PrismError::Graph(_)));
}

#[test]
fn test_cancelled_render() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let token = CancelToken::new();
    token.cancel();
    let err = engine(1, true)
        .render(&graph, over, Rect::new(0, 0, 8, 8), Some(&token))
        .unwrap_err();
    assert!(matches!(err, PrismError::Cancelled));
    assert!(graph.cached_region(over).unwrap().is_empty());
}

#[test]
fn test_threaded_render_matches_sequential() {
    let mut graph = Graph::new();
    let board = graph
        .create_node(NodeSpec::new("prism:checkerboard").with("size", 5))
        .unwrap();
    let blur = graph
        .create_node(NodeSpec::new("prism:box-blur").with("radius", 2))
        .unwrap();
    graph.link(&[board, blur]).unwrap();
    let fg = graph
        .create_node(
            NodeSpec::new("prism:rectangle")
                .with("x", 3.5)
                .with("y", 3.5)
                .with("width", 20.0)
                .with("height", 9.0)
                .with("color", Colour::new(0.2, 0.8, 0.1, 0.5)),
        )
        .unwrap();
    let over = graph.create_node(NodeSpec::new("prism:over")).unwrap();
    graph.connect(blur, "output", over, "input").unwrap();
    graph.connect(fg, "output", over, "aux").unwrap();

    let roi = Rect::new(-7, -3, 40, 30);
    let sequential = engine(1, false).render(&graph, over, roi, None).unwrap();
    let threaded = engine(4, false).render(&graph, over, roi, None).unwrap();
    let format = rgba();
    assert_eq!(
        sequential.get(roi, 1.0, &format, AbyssPolicy::None).unwrap(),
        threaded.get(roi, 1.0, &format, AbyssPolicy::None).unwrap()
    );
}

#[test]
fn test_cached_render_matches_uncached() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let cached = engine(1, true);
    // Two overlapping requests exercise partial cache hits.
    cached.render(&graph, over, Rect::new(0, 0, 16, 16), None).unwrap();
    let roi = Rect::new(8, 8, 16, 16);
    let warm = cached.render(&graph, over, roi, None).unwrap();
    let cold = engine(1, false).render(&graph, over, roi, None).unwrap();
    let format = rgba();
    assert_eq!(
        warm.get(roi, 1.0, &format, AbyssPolicy::None).unwrap(),
        cold.get(roi, 1.0, &format, AbyssPolicy::None).unwrap()
    );
}

#[test]
fn test_blit_converts_and_scales() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let rect = Rect::new(0, 0, 16, 16);
    let stride = 16 * 4 + 8;
    let mut dst = vec![7u8; stride * 16];
    engine(1, true)
        .blit(&graph, over, 0.5, rect, &format, &mut dst, Some(stride), BlitFlags::DEFAULT, None)
        .unwrap();
    // Destination (7, 7) samples source (15, 15), inside the square.
    let at = |x: usize, y: usize| &dst[y * stride + x * 4..y * stride + x * 4 + 4];
    assert_eq!(at(7, 7), &[255, 0, 0, 255]);
    assert_eq!(at(1, 1), &[0, 0, 255, 255]);
    // Padding between rows is untouched.
    assert_eq!(dst[16 * 4], 7);
}

#[test]
fn test_blit_dirty_without_cache_is_zero() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let mut dst = vec![9u8; 4 * 4 * 4];
    engine(1, true)
        .blit(&graph, over, 1.0, Rect::new(0, 0, 4, 4), &format, &mut dst, None, BlitFlags::DIRTY, None)
        .unwrap();
    assert!(dst.iter().all(|&b| b == 0));
}

#[test]
fn test_blit_dirty_returns_cached_pixels() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let engine = engine(1, true);
    let rect = Rect::new(8, 8, 8, 8);
    engine.render(&graph, over, rect, None).unwrap();

    let format = prism_color::format("R'G'B'A u8").unwrap();
    let mut dst = vec![0u8; 8 * 8 * 4];
    engine
        .blit(&graph, over, 1.0, rect, &format, &mut dst, None, BlitFlags::DIRTY, None)
        .unwrap();
    assert_eq!(&dst[..4], &[0, 0, 255, 255]);
    let last = dst.len() - 4;
    assert_eq!(&dst[last..], &[255, 0, 0, 255]);
}

#[test]
fn test_blit_rejects_short_destination() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let format = prism_color::format("R'G'B'A u8").unwrap();
    let mut dst = vec![0u8; 10];
    assert!(
        engine(1, true)
            .blit(&graph, over, 1.0, Rect::new(0, 0, 4, 4), &format, &mut dst, None, BlitFlags::DEFAULT, None)
            .is_err()
    );
}

#[test]
fn test_process_sink_writes_buffer() {
    let mut graph = Graph::new();
    let target = Buffer::new(Rect::new(2, 2, 6, 6), &rgba()).unwrap();
    let board = graph
        .create_node(
            NodeSpec::new("prism:checkerboard")
                .with("size", 1)
                .with("color1", Colour::BLACK)
                .with("color2", Colour::WHITE),
        )
        .unwrap();
    let sink = graph
        .create_node(NodeSpec::new("prism:write-buffer").with("buffer", target.clone()))
        .unwrap();
    graph.link(&[board, sink]).unwrap();
    engine(1, true).process(&graph, sink, None).unwrap();

    assert_pixel(pixel(&target, 2, 2), [0.0, 0.0, 0.0, 1.0]);
    assert_pixel(pixel(&target, 3, 2), [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(graph.state(sink).unwrap(), NodeState::Processed);
}

#[test]
fn test_process_infinite_bbox_is_rejected() {
    let mut graph = Graph::new();
    let board = graph.create_node(NodeSpec::new("prism:checkerboard")).unwrap();
    assert!(engine(1, true).process(&graph, board, None).is_err());
}

#[test]
fn test_render_sink_has_no_output() {
    let mut graph = Graph::new();
    let target = Buffer::new(Rect::new(0, 0, 2, 2), &rgba()).unwrap();
    let board = graph.create_node(NodeSpec::new("prism:checkerboard")).unwrap();
    let sink = graph
        .create_node(NodeSpec::new("prism:write-buffer").with("buffer", target))
        .unwrap();
    graph.link(&[board, sink]).unwrap();
    assert!(
        engine(1, true)
            .render(&graph, sink, Rect::new(0, 0, 2, 2), None)
            .is_err()
    );
}

#[test]
fn test_detect_prefers_foreground() {
    let mut graph = Graph::new();
    let (bg, fg, over) = scene(&mut graph);
    let engine = engine(1, true);
    assert_eq!(engine.detect(&graph, over, 15, 15).unwrap(), Some(fg));
    assert_eq!(engine.detect(&graph, over, 2, 2).unwrap(), Some(bg));
}

#[test]
fn test_detect_skips_transparent_pixels() {
    let mut graph = Graph::new();
    let fg = graph
        .create_node(
            NodeSpec::new("prism:rectangle")
                .with("width", 4.0)
                .with("height", 4.0)
                .with("color", Colour::TRANSPARENT),
        )
        .unwrap();
    assert_eq!(engine(1, true).detect(&graph, fg, 1, 1).unwrap(), None);
    assert_eq!(engine(1, true).detect(&graph, fg, 10, 10).unwrap(), None);
}

#[test]
fn test_graph_node_renders_through_proxies() {
    let mut graph = Graph::new();
    let source = graph
        .create_node(NodeSpec::new("prism:color").with("value", Colour::new(0.25, 0.5, 0.75, 1.0)))
        .unwrap();
    let group = graph.create_graph(None).unwrap();
    let invert = graph
        .create_child(group, NodeSpec::new("prism:invert-linear"))
        .unwrap();
    let input = graph.input_proxy(group).unwrap();
    let output = graph.output_proxy(group).unwrap();
    graph.connect(input, "output", invert, "input").unwrap();
    graph.connect(invert, "output", output, "input").unwrap();
    graph.connect(source, "output", group, "input").unwrap();

    let engine = engine(1, true);
    let out = engine.render(&graph, group, Rect::new(0, 0, 4, 4), None).unwrap();
    assert_pixel(pixel(&out, 0, 0), [0.75, 0.5, 0.25, 1.0]);

    // Changing the outer source reaches the cached child.
    graph.set_property(source, "value", Colour::WHITE).unwrap();
    assert!(graph.cached_region(group).unwrap().is_empty());
    let out = engine.render(&graph, group, Rect::new(0, 0, 4, 4), None).unwrap();
    assert_pixel(pixel(&out, 0, 0), [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_json_graph_renders_like_original() {
    let mut graph = Graph::new();
    let (_, _, over) = scene(&mut graph);
    let json = graph.to_json(over).unwrap();
    let (copy, copy_over) = Graph::from_json(&json).unwrap();

    let roi = Rect::new(0, 0, 24, 24);
    let format = rgba();
    let a = engine(1, false).render(&graph, over, roi, None).unwrap();
    let b = engine(1, false).render(&copy, copy_over, roi, None).unwrap();
    assert_eq!(
        a.get(roi, 1.0, &format, AbyssPolicy::None).unwrap(),
        b.get(roi, 1.0, &format, AbyssPolicy::None).unwrap()
    );
}

#[test]
fn test_shrunken_bbox_leaves_no_stale_pixels() {
    let square = |graph: &mut Graph, width: f64| {
        let rect = graph
            .create_node(
                NodeSpec::new("prism:rectangle")
                    .with("width", width)
                    .with("height", 10.0)
                    .with("color", Colour::WHITE),
            )
            .unwrap();
        let blur = graph
            .create_node(NodeSpec::new("prism:box-blur").with("radius", 2))
            .unwrap();
        graph.link(&[rect, blur]).unwrap();
        (rect, blur)
    };
    let roi = Rect::new(0, 0, 16, 16);
    let format = rgba();

    let mut graph = Graph::new();
    let (rect, blur) = square(&mut graph, 10.0);
    let cached = engine(1, true);
    cached.render(&graph, blur, roi, None).unwrap();
    graph.set_property(rect, "width", 5.0).unwrap();
    let edited = cached.render(&graph, blur, roi, None).unwrap();

    let mut fresh_graph = Graph::new();
    let (_, fresh_blur) = square(&mut fresh_graph, 5.0);
    let fresh = engine(1, false).render(&fresh_graph, fresh_blur, roi, None).unwrap();

    assert_pixel(pixel(&edited, 8, 5), [0.0; 4]);
    assert_eq!(
        edited.get(roi, 1.0, &format, AbyssPolicy::None).unwrap(),
        fresh.get(roi, 1.0, &format, AbyssPolicy::None).unwrap()
    );
}

#[test]
fn test_buffer_source_follows_source_writes() {
    let extent = Rect::new(0, 0, 8, 8);
    let source = Buffer::new(extent, &rgba()).unwrap();
    source.set_color(extent, &Colour::WHITE).unwrap();

    let mut graph = Graph::new();
    let input = graph
        .create_node(NodeSpec::new("prism:buffer-source").with("buffer", source.clone()))
        .unwrap();
    let nop = graph.create_node(NodeSpec::new("prism:nop")).unwrap();
    graph.link(&[input, nop]).unwrap();

    let engine = engine(1, true);
    engine.render(&graph, nop, extent, None).unwrap();
    assert_eq!(graph.cached_region(nop).unwrap().area(), extent.area());

    source.set_color(Rect::new(0, 0, 4, 8), &Colour::BLACK).unwrap();
    assert_eq!(graph.cached_region(nop).unwrap().area(), extent.area() / 2);

    let out = engine.render(&graph, nop, extent, None).unwrap();
    assert_pixel(pixel(&out, 1, 1), [0.0, 0.0, 0.0, 1.0]);
    assert_pixel(pixel(&out, 6, 1), [1.0, 1.0, 1.0, 1.0]);
}

#[test]
fn test_replaced_source_buffer_is_no_longer_watched() {
    let extent = Rect::new(0, 0, 4, 4);
    let first = Buffer::new(extent, &rgba()).unwrap();
    let second = Buffer::new(extent, &rgba()).unwrap();
    second.set_color(extent, &Colour::WHITE).unwrap();

    let mut graph = Graph::new();
    let input = graph
        .create_node(NodeSpec::new("prism:buffer-source").with("buffer", first.clone()))
        .unwrap();
    graph.set_property(input, "buffer", second).unwrap();

    let engine = engine(1, true);
    engine.render(&graph, input, extent, None).unwrap();
    first.set_color(extent, &Colour::BLACK).unwrap();
    assert_eq!(graph.cached_region(input).unwrap().area(), extent.area());

    graph.remove_node(input).unwrap();
    first.set_color(extent, &Colour::WHITE).unwrap();
}
