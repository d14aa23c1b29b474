mod event_bus_tests;
