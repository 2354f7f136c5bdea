//! Integration tests for the probe pipeline
//!
//! These tests drive the scanner and device probe end to end over the mock
//! transport:
//! - Filtering, opening and probing across several enumerated ports
//! - Lock contention retries and give-up
//! - Fragmented and missing responses
//! - Handle cleanup on every failure path

use std::time::Duration;

use sigprobe::mock::{MockDevice, MockTransport};
use sigprobe::{
    DeviceProbe, FilterGroup, PortDescriptor, PortField, PortScanner, ProbeError, ProbeSpec,
};
use tokio::time::Instant;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Spec for a device answering `*IDN?` with a SCPI identification string
    pub fn scope_spec() -> ProbeSpec {
        ProbeSpec::new("Scope", 115200, "*IDN?\n", "RIGOL TECHNOLOGIES")
    }

    pub fn usb_port(path: &str, manufacturer: Option<&str>, product: Option<&str>) -> PortDescriptor {
        PortDescriptor {
            vid: Some(0x1ab1),
            pid: Some(0x04ce),
            manufacturer: manufacturer.map(str::to_string),
            product: product.map(str::to_string),
            ..PortDescriptor::new(path)
        }
    }

    pub fn vendor_or_product_filter(spec: ProbeSpec) -> ProbeSpec {
        spec.with_filter_group(
            FilterGroup::new()
                .with(PortField::Manufacturer, "^FTDI$")
                .unwrap(),
        )
        .with_filter_group(FilterGroup::new().with(PortField::Product, "^CP210").unwrap())
    }
}

// ============================================================================
// Scan Tests
// ============================================================================

mod scan_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn only_the_responding_filtered_port_is_returned() {
        let transport = MockTransport::new()
            // Fails the filter
            .with_port(
                helpers::usb_port("/dev/ttyUSB0", Some("Prolific"), Some("PL2303")),
                MockDevice::replying(["RIGOL TECHNOLOGIES"]),
            )
            // Passes the filter, never answers
            .with_port(
                helpers::usb_port("/dev/ttyUSB1", Some("FTDI"), Some("FT232R")),
                MockDevice::silent(),
            )
            // Passes the filter, answers
            .with_port(
                helpers::usb_port("/dev/tty.usbserial-3", Some("Silicon Labs"), Some("CP2104")),
                MockDevice::replying(["RIGOL TECHNOLOGIES,DS1054Z\n"]),
            );
        let spec = helpers::vendor_or_product_filter(helpers::scope_spec());
        let scanner = PortScanner::new(transport);

        let results = scanner.probe_all(&spec).await.unwrap();

        assert_eq!(results.len(), 1);
        let found = &results[0];
        assert_eq!(found.prober, "Scope");
        assert_eq!(found.port.path, "/dev/cu.usbserial-3");
        assert_eq!(found.port.product.as_deref(), Some("CP2104"));
        assert_eq!(found.handle.path(), "/dev/cu.usbserial-3");

        let transport = scanner.transport();
        assert!(transport.open_attempts("/dev/ttyUSB0").is_empty());
        assert_eq!(transport.opened_paths(), vec!["/dev/ttyUSB1", "/dev/cu.usbserial-3"]);
        assert_eq!(transport.closed_ports(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn locked_port_is_skipped_and_scan_continues() {
        let transport = MockTransport::new()
            .with_port(
                helpers::usb_port("/dev/ttyUSB0", Some("FTDI"), None),
                MockDevice::replying(["RIGOL TECHNOLOGIES"]).locked_for(20),
            )
            .with_port(
                helpers::usb_port("/dev/ttyUSB1", Some("FTDI"), None),
                MockDevice::replying(["RIGOL TECHNOLOGIES"]).locked_for(2),
            );
        let spec = helpers::vendor_or_product_filter(helpers::scope_spec());
        let scanner = PortScanner::new(transport);
        let start = Instant::now();

        let results = scanner.probe_all(&spec).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].port.path, "/dev/ttyUSB1");
        assert_eq!(scanner.transport().open_attempts("/dev/ttyUSB0").len(), 5);
        assert_eq!(scanner.transport().open_attempts("/dev/ttyUSB1").len(), 3);
        // Four retry waits on the first port, two on the second
        assert!(start.elapsed() >= Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn every_matching_device_is_returned_in_enumeration_order() {
        let transport = MockTransport::new()
            .with_port(
                helpers::usb_port("/dev/ttyUSB2", Some("FTDI"), None),
                MockDevice::replying(["RIGOL", " TECHNOLOGIES"]).with_reply_delay(Duration::from_millis(100)),
            )
            .with_port(
                helpers::usb_port("/dev/ttyUSB0", Some("FTDI"), None),
                MockDevice::replying(["RIGOL TECHNOLOGIES"]),
            );
        let spec = helpers::scope_spec();
        let scanner = PortScanner::new(transport);

        let results = scanner.probe_all(&spec).await.unwrap();

        let paths: Vec<_> = results.iter().map(|r| r.port.path.as_str()).collect();
        assert_eq!(paths, vec!["/dev/ttyUSB2", "/dev/ttyUSB0"]);
    }

    #[tokio::test]
    async fn no_ports_yields_empty_result() {
        let scanner = PortScanner::new(MockTransport::new());

        let results = scanner.probe_all(&helpers::scope_spec()).await.unwrap();

        assert!(results.is_empty());
    }
}

// ============================================================================
// Single-Port Open Tests
// ============================================================================

mod open_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn response_split_across_many_chunks_is_accepted() {
        let reply = "RIGOL TECHNOLOGIES,DS1054Z";
        for chunk_size in 1..=reply.len() {
            let chunks: Vec<_> = reply.as_bytes().chunks(chunk_size).map(<[u8]>::to_vec).collect();
            let transport = MockTransport::new().with_device(
                "/dev/ttyACM0",
                MockDevice::replying(chunks).with_reply_delay(Duration::from_millis(10)),
            );
            let mut probe = DeviceProbe::new(transport, helpers::scope_spec()).unwrap();

            let result = probe.open("/dev/ttyACM0").await;

            assert!(result.is_ok(), "chunk size {chunk_size}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out_at_deadline() {
        let transport = MockTransport::new().with_device("/dev/ttyACM0", MockDevice::silent());
        let mut probe = DeviceProbe::new(transport, helpers::scope_spec()).unwrap();
        let start = Instant::now();

        let err = probe.open("/dev/ttyACM0").await.unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "fired early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(505));
        assert!(matches!(
            err,
            ProbeError::ProbeTimeout { ref device, ref port } if device == "Scope" && port == "/dev/ttyACM0"
        ));
        assert_eq!(probe.scanner().transport().closed_ports(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_released_after_retries_opens() {
        let transport = MockTransport::new().with_device(
            "/dev/ttyACM0",
            MockDevice::replying(["RIGOL TECHNOLOGIES"]).locked_for(4),
        );
        let mut probe = DeviceProbe::new(transport, helpers::scope_spec()).unwrap();

        probe.open("/dev/ttyACM0").await.unwrap();

        let attempts = probe.scanner().transport().open_attempts("/dev/ttyACM0");
        assert_eq!(attempts.len(), 5);
        for pair in attempts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_millis(1000) && gap < Duration::from_millis(1005));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lock_never_released_gives_up_after_five_attempts() {
        let transport = MockTransport::new()
            .with_device("/dev/ttyACM0", MockDevice::replying(["RIGOL TECHNOLOGIES"]).locked_for(5));
        let mut probe = DeviceProbe::new(transport, helpers::scope_spec()).unwrap();

        let err = probe.open("/dev/ttyACM0").await.unwrap_err();

        assert!(matches!(err, ProbeError::LockTimeout { attempts: 5, .. }));
        assert_eq!(probe.scanner().transport().open_attempts("/dev/ttyACM0").len(), 5);
        assert!(!probe.is_open());
    }
}
