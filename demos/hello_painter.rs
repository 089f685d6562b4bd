use gosub_render::geometry::{Point, Rect};
use gosub_render::render::backend::{SurfaceSize, WindowHandle};
use gosub_render::render::Color;
use gosub_render::resource::{GradientStop, LinearGradient, Path, SolidBrush};
use gosub_render::{launch_default, RenderConfig, RenderError, RenderEvent};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), RenderError> {
    env_logger::init();

    // Pick the backend with GOSUB_RENDER_BACKEND (null or recording). The
    // render loop runs on its own thread, paced at 60 frames per second.
    let config = RenderConfig::builder()
        .backend_from_env()
        .max_fps(60)
        .background(Color::from_u8(0x20, 0x20, 0x28, 0xff))
        .build()?;
    let renderer = launch_default(config)?;
    let handle = renderer.handle();

    // Events are only received from this point on.
    let mut events = renderer.subscribe();

    // Resources are shared between painters. Each painter's render target gets
    // its own realization the first time it draws with one.
    let bar = SolidBrush::new(Color::new(0.9, 0.4, 0.1, 1.0));
    let sky = LinearGradient::new(
        Point::new(0.0, 0.0),
        Point::new(0.0, 200.0),
        vec![
            GradientStop::new(0.0, Color::new(0.2, 0.4, 0.9, 1.0)),
            GradientStop::new(1.0, Color::WHITE),
        ],
    );
    let frame = Path::rect(Rect::new(10.0, 10.0, 300.0, 180.0));

    // Animate for 120 frames, then stop asking for more.
    let frames = Arc::new(AtomicU32::new(0));
    let counter = frames.clone();
    let painter = {
        let (bar, sky, frame) = (bar.clone(), sky.clone(), frame.clone());
        handle.create_painter(move |size, g| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            g.fill_rect(Rect::from_size(size), &sky)?;
            let width = size.width * (n % 120) as f32 / 120.0;
            g.fill_rect(Rect::new(0.0, size.height - 20.0, width, 20.0), &bar)?;
            g.stroke_path(&frame, &bar, 2.0)?;
            Ok(n < 120)
        })?
    };

    let window = WindowHandle(1);
    painter.resize(SurfaceSize::new(640, 400), 2.0)?;
    if !painter.attach(window)? {
        println!("backend has no render target for {window}");
        return renderer.shutdown();
    }

    // The first repaint renders a frame; after that the scheduler drives the
    // painter until the callback returns false.
    painter.repaint()?;

    // Changing the brush color patches every realization in place.
    std::thread::sleep(Duration::from_millis(500));
    bar.set_color(Color::new(0.1, 0.8, 0.3, 1.0));

    // Stand-in for the window's event loop. Backends that present through the
    // UI thread ask for a window paint, which puts the pending frame on screen.
    while frames.load(Ordering::SeqCst) <= 120 {
        while let Ok(event) = events.try_recv() {
            match event {
                RenderEvent::UiRepaintRequested { .. } => painter.expose()?,
                RenderEvent::ContinuousChanged { .. } => log::debug!("{event:?}"),
                other => println!("event: {other:?}"),
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    painter.detach()?;
    renderer.shutdown()?;
    println!("rendered {} frames", frames.load(Ordering::SeqCst));
    Ok(())
}
